//! Transfer and debt engine over the balance rows.
//!
//! Every mutation is a conditional row update: the availability check is
//! part of the update predicate, so a spend that would drive `remaining`
//! negative matches nothing and fails without touching the row, even under
//! concurrent callers.

use chas_core::{CommunityId, CoreError, Result, UserId};
use chas_store::{patch, Query, TableRef};
use chrono::Utc;
use tracing::{debug, info};

use crate::models::Balance;

#[derive(Clone)]
pub struct CreditEngine {
    balances: TableRef<Balance>,
}

impl CreditEngine {
    pub fn new(balances: TableRef<Balance>) -> Self {
        Self { balances }
    }

    /// The balance row for a user in a community
    pub async fn balance(&self, user_id: UserId, community_id: CommunityId) -> Result<Balance> {
        self.balances
            .select_one(Query::new().filter(move |balance: &Balance| {
                balance.user_id == user_id && balance.community_id == community_id
            }))
            .await?
            .ok_or_else(|| CoreError::not_found("Balance"))
    }

    /// Create the balance row if absent, otherwise return the existing one
    pub async fn ensure_balance(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        daily_budget: i64,
    ) -> Result<Balance> {
        if let Some(existing) = self
            .balances
            .select_one(Query::new().filter(move |balance: &Balance| {
                balance.user_id == user_id && balance.community_id == community_id
            }))
            .await?
        {
            return Ok(existing);
        }

        debug!(%user_id, %community_id, daily_budget, "creating balance row");
        Ok(self
            .balances
            .insert(Balance::new(user_id, community_id, daily_budget))
            .await?)
    }

    /// Deduct CC from a user and return the updated balance.
    ///
    /// Callers pay before creating the record the spend backs, so a failure
    /// here blocks the dependent action.
    pub async fn spend(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        amount: i64,
    ) -> Result<Balance> {
        let updated = self
            .balances
            .update(
                Query::new().filter(move |balance: &Balance| {
                    balance.user_id == user_id
                        && balance.community_id == community_id
                        && balance.remaining >= amount
                }),
                patch(move |balance: &mut Balance| {
                    balance.remaining -= amount;
                    balance.spent_today += amount;
                }),
            )
            .await?;

        if let Some(balance) = updated.into_iter().next() {
            return Ok(balance);
        }
        // Nothing matched: either the row is missing or funds are short.
        let balance = self.balance(user_id, community_id).await?;
        Err(CoreError::InsufficientFunds {
            required: amount,
            available: balance.remaining,
        })
    }

    /// Transfer CC from lender to borrower, accruing debt on the borrower.
    ///
    /// The two balance rows are written independently; when the borrower
    /// write fails after the lender debit succeeded the ledger is left in a
    /// detectable inconsistent state. The store offers no multi-row
    /// transaction here, so this window is accepted and surfaced to the
    /// caller as an error.
    pub async fn transfer(
        &self,
        lender_id: UserId,
        borrower_id: UserId,
        community_id: CommunityId,
        amount: i64,
    ) -> Result<(Balance, Balance)> {
        // Borrower row must exist before any money moves.
        self.balance(borrower_id, community_id).await?;

        let lender = self.spend(lender_id, community_id, amount).await?;

        let updated = self
            .balances
            .update(
                Query::new().filter(move |balance: &Balance| {
                    balance.user_id == borrower_id && balance.community_id == community_id
                }),
                patch(move |balance: &mut Balance| {
                    balance.remaining += amount;
                    balance.debt += amount;
                }),
            )
            .await?;
        let borrower = updated
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("Balance"))?;

        info!(%lender_id, %borrower_id, %community_id, amount, "transferred CC");
        Ok((lender, borrower))
    }

    /// Return an escrowed stake to its proposer
    pub async fn refund(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        amount: i64,
    ) -> Result<Balance> {
        let updated = self
            .balances
            .update(
                Query::new().filter(move |balance: &Balance| {
                    balance.user_id == user_id && balance.community_id == community_id
                }),
                patch(move |balance: &mut Balance| {
                    balance.remaining += amount;
                    balance.spent_today = (balance.spent_today - amount).max(0);
                }),
            )
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("Balance"))
    }

    /// Apply the daily reset, repaying debt from the new allocation first.
    ///
    /// With outstanding debt the repayment is `min(daily_budget, debt)`;
    /// the repaid portion shows up as `spent_today` so the day starts with
    /// `daily_budget - repayment` available.
    pub async fn reset_with_debt(&self, balance: &Balance) -> Result<Balance> {
        let user_id = balance.user_id;
        let community_id = balance.community_id;
        let updated = self
            .balances
            .update(
                Query::new().filter(move |balance: &Balance| {
                    balance.user_id == user_id && balance.community_id == community_id
                }),
                patch(move |balance: &mut Balance| {
                    if balance.debt > 0 {
                        let repayment = balance.daily_budget.min(balance.debt);
                        balance.debt -= repayment;
                        balance.remaining = balance.daily_budget - repayment;
                        balance.spent_today = repayment;
                    } else {
                        balance.remaining = balance.daily_budget;
                        balance.spent_today = 0;
                    }
                    balance.last_reset = Utc::now();
                }),
            )
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("Balance"))
    }

    /// Every balance row, for the scheduled jobs
    pub async fn list_balances(&self) -> Result<Vec<Balance>> {
        Ok(self
            .balances
            .select_many(Query::new().order_by(|a: &Balance, b: &Balance| {
                a.community_id.cmp(&b.community_id)
            }))
            .await?)
    }

    /// Balances with CC still available today
    pub async fn balances_with_remaining(&self) -> Result<Vec<Balance>> {
        Ok(self
            .balances
            .select_many(Query::new().filter(|balance: &Balance| balance.remaining > 0))
            .await?)
    }
}
