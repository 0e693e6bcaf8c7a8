//! CHAS - accounting and group-decision core for community currencies.
//!
//! This crate re-exports the workspace crates that make up the core:
//! balances and ledger entries, peer-to-peer credit with debt tracking,
//! escrow-backed tip-to-tip proposals, and moderator elections.

pub use chas_cache as cache;
pub use chas_community as community;
pub use chas_core as core;
pub use chas_governance as governance;
pub use chas_ledger as ledger;
pub use chas_store as store;
