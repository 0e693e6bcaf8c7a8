//! Balance, ledger entry, and borrow request rows.

use chas_core::{CommunityId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's daily allowance state in one community.
///
/// `spent_today + remaining` is not required to equal `daily_budget` once
/// transfers or debt are involved: remaining only decreases on spend or
/// transfer-out and increases on transfer-in or refund; debt only increases
/// on receiving a transfer and decreases on a reset that applies repayment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub daily_budget: i64,
    pub spent_today: i64,
    pub remaining: i64,
    pub debt: i64,
    pub last_reset: DateTime<Utc>,
}

impl Balance {
    /// A fresh balance with the full budget available
    pub fn new(user_id: UserId, community_id: CommunityId, daily_budget: i64) -> Self {
        Self {
            user_id,
            community_id,
            daily_budget,
            spent_today: 0,
            remaining: daily_budget,
            debt: 0,
            last_reset: Utc::now(),
        }
    }
}

/// Kind of balance-affecting event a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    DailyReset,
    Declaration,
    BorrowGiven,
    BorrowReceived,
    TipToTip,
    Expired,
}

/// Immutable, append-only audit record of a balance-affecting event.
///
/// Never updated or deleted; the signed amount is negative for outflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub kind: EntryKind,
    pub amount: i64,
    pub description: String,
    /// The originating declaration, borrow request, or proposal
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: UserId,
        community_id: CommunityId,
        kind: EntryKind,
        amount: i64,
        description: impl Into<String>,
        reference_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            community_id,
            kind,
            amount,
            description: description.into(),
            reference_id,
            created_at: Utc::now(),
        }
    }
}

/// Status of a borrow request; Pending transitions once and is terminal after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Approved,
    Declined,
}

/// The lender's decision on a pending borrow request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowAction {
    Approve,
    Decline,
}

/// A peer-to-peer borrow request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub id: Uuid,
    pub borrower_id: UserId,
    pub lender_id: UserId,
    pub community_id: CommunityId,
    pub amount: i64,
    pub reason: String,
    pub status: BorrowStatus,
    pub created_at: DateTime<Utc>,
}
