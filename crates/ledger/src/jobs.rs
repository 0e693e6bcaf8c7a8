//! Scheduled job bodies for the ledger.
//!
//! The scheduler itself is an external collaborator; it invokes these on
//! its own cadence, never inside a request.

use chas_core::Result;
use tracing::info;

use crate::book::LedgerBook;
use crate::credit::CreditEngine;
use crate::models::EntryKind;

/// Reset every balance and apply debt repayments, recording one
/// `DailyReset` ledger entry per balance with the post-reset remaining.
///
/// Returns the number of balances reset.
pub async fn daily_cc_reset(credit: &CreditEngine, book: &LedgerBook) -> Result<usize> {
    let balances = credit.list_balances().await?;
    for balance in &balances {
        let updated = credit.reset_with_debt(balance).await?;
        book.record(
            updated.user_id,
            updated.community_id,
            EntryKind::DailyReset,
            updated.remaining,
            "Daily CC reset",
            None,
        )
        .await?;
    }

    info!(count = balances.len(), "daily_cc_reset completed");
    Ok(balances.len())
}
