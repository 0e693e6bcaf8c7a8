//! Append-only ledger entry book.

use chas_core::{CommunityId, CoreError, Result, UserId};
use chas_store::{Query, TableRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Balance, EntryKind, LedgerEntry};

/// Aggregates for the ledger page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Sum of absolute amounts over negative declaration entries
    pub total_spent_all_time: i64,
    pub remaining_today: i64,
    pub spent_today: i64,
}

/// Creates and queries ledger entries.
#[derive(Clone)]
pub struct LedgerBook {
    entries: TableRef<LedgerEntry>,
    balances: TableRef<Balance>,
}

impl LedgerBook {
    pub fn new(entries: TableRef<LedgerEntry>, balances: TableRef<Balance>) -> Self {
        Self { entries, balances }
    }

    /// Append one entry; store rejections surface as `InvalidInput`
    pub async fn record(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: EntryKind,
        amount: i64,
        description: impl Into<String>,
        reference_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry::new(user_id, community_id, kind, amount, description, reference_id);
        Ok(self.entries.insert(entry).await?)
    }

    /// Entries for a user in a community, newest first, with the total
    /// count for pagination
    pub async fn entries(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<LedgerEntry>, usize)> {
        let scope = move |entry: &LedgerEntry| {
            entry.user_id == user_id && entry.community_id == community_id
        };
        let rows = self
            .entries
            .select_many(
                Query::new()
                    .filter(scope)
                    .order_by(|a: &LedgerEntry, b: &LedgerEntry| a.created_at.cmp(&b.created_at))
                    .descending()
                    .limit(limit)
                    .offset(offset),
            )
            .await?;
        let total = self.entries.count(Query::new().filter(scope)).await?;
        Ok((rows, total))
    }

    /// Summary stats for the ledger page
    pub async fn summary(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<LedgerSummary> {
        let declarations = self
            .entries
            .select_many(Query::new().filter(move |entry: &LedgerEntry| {
                entry.user_id == user_id
                    && entry.community_id == community_id
                    && entry.kind == EntryKind::Declaration
            }))
            .await?;
        let total_spent_all_time = declarations
            .iter()
            .filter(|entry| entry.amount < 0)
            .map(|entry| entry.amount.abs())
            .sum();

        let balance = self
            .balances
            .select_one(Query::new().filter(move |balance: &Balance| {
                balance.user_id == user_id && balance.community_id == community_id
            }))
            .await?
            .ok_or_else(|| CoreError::not_found("Balance"))?;

        Ok(LedgerSummary {
            total_spent_all_time,
            remaining_today: balance.remaining,
            spent_today: balance.spent_today,
        })
    }
}
