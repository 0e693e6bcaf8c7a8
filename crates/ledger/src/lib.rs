//! Balance ledger and credit engine for the CHAS core.
//!
//! Owns the per-(user, community) CC balance rows and the append-only
//! ledger entries recording every balance-affecting event, and implements
//! the monetary operations on top of them: spend, peer-to-peer transfer
//! with debt accrual, refund, and the daily reset with debt repayment.
//! The borrow-request lifecycle sits on the transfer operation.

mod book;
mod borrow;
mod credit;
mod models;

pub mod jobs;

pub use book::{LedgerBook, LedgerSummary};
pub use borrow::{BorrowDesk, BorrowOutcome};
pub use credit::CreditEngine;
pub use models::{Balance, BorrowAction, BorrowRequest, BorrowStatus, EntryKind, LedgerEntry};
