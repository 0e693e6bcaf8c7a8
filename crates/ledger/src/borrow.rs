//! Peer-to-peer borrow request lifecycle.

use std::sync::Arc;

use chas_community::CommunityDirectory;
use chas_core::{CommunityId, CoreError, Result, UserId};
use chas_store::{patch, Query, TableRef};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::book::LedgerBook;
use crate::credit::CreditEngine;
use crate::models::{Balance, BorrowAction, BorrowRequest, BorrowStatus, EntryKind};

/// Result of a lender responding to a borrow request
#[derive(Debug, Clone)]
pub struct BorrowOutcome {
    pub request: BorrowRequest,
    /// The lender's balance after an approval; `None` on decline
    pub lender_balance: Option<Balance>,
}

/// Creates and resolves borrow requests.
pub struct BorrowDesk {
    requests: TableRef<BorrowRequest>,
    credit: CreditEngine,
    book: LedgerBook,
    directory: Arc<CommunityDirectory>,
}

impl BorrowDesk {
    pub fn new(
        requests: TableRef<BorrowRequest>,
        credit: CreditEngine,
        book: LedgerBook,
        directory: Arc<CommunityDirectory>,
    ) -> Self {
        Self {
            requests,
            credit,
            book,
            directory,
        }
    }

    /// Create a pending borrow request
    pub async fn request(
        &self,
        borrower_id: UserId,
        community_id: CommunityId,
        lender_id: UserId,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<BorrowRequest> {
        if borrower_id == lender_id {
            return Err(CoreError::invalid_input(
                "Borrower and lender cannot be the same user",
            ));
        }
        if amount < 1 {
            return Err(CoreError::invalid_input("Amount must be at least 1"));
        }

        self.directory.ensure_member(borrower_id, community_id).await?;
        self.directory.ensure_member(lender_id, community_id).await?;

        let request = self
            .requests
            .insert(BorrowRequest {
                id: Uuid::new_v4(),
                borrower_id,
                lender_id,
                community_id,
                amount,
                reason: reason.into(),
                status: BorrowStatus::Pending,
                created_at: Utc::now(),
            })
            .await?;
        info!(request_id = %request.id, %borrower_id, %lender_id, amount, "borrow request created");
        Ok(request)
    }

    /// One borrow request in a community
    pub async fn get(&self, request_id: Uuid, community_id: CommunityId) -> Result<BorrowRequest> {
        self.requests
            .select_one(Query::new().filter(move |request: &BorrowRequest| {
                request.id == request_id && request.community_id == community_id
            }))
            .await?
            .ok_or_else(|| CoreError::not_found("Borrow request"))
    }

    /// Approve or decline a pending request; only the lender may respond
    pub async fn respond(
        &self,
        request_id: Uuid,
        community_id: CommunityId,
        actor_id: UserId,
        action: BorrowAction,
    ) -> Result<BorrowOutcome> {
        let request = self.get(request_id, community_id).await?;

        if request.lender_id != actor_id {
            return Err(CoreError::forbidden(
                "Only the lender can respond to this request",
            ));
        }
        if request.status != BorrowStatus::Pending {
            return Err(CoreError::conflict("Borrow request already resolved"));
        }

        match action {
            BorrowAction::Approve => self.approve(request).await,
            BorrowAction::Decline => self.decline(request).await,
        }
    }

    async fn approve(&self, request: BorrowRequest) -> Result<BorrowOutcome> {
        let amount = request.amount;
        let (lender_balance, _) = self
            .credit
            .transfer(
                request.lender_id,
                request.borrower_id,
                request.community_id,
                amount,
            )
            .await?;

        let updated = self.transition(request.id, BorrowStatus::Approved).await?;

        let lender = self.directory.user(request.lender_id).await?;
        let borrower = self.directory.user(request.borrower_id).await?;
        self.book
            .record(
                request.lender_id,
                request.community_id,
                EntryKind::BorrowGiven,
                -amount,
                format!("Borrowed {} CC to {}", amount, borrower.display_name),
                Some(request.id),
            )
            .await?;
        self.book
            .record(
                request.borrower_id,
                request.community_id,
                EntryKind::BorrowReceived,
                amount,
                format!("Borrowed {} CC from {}", amount, lender.display_name),
                Some(request.id),
            )
            .await?;

        Ok(BorrowOutcome {
            request: updated,
            lender_balance: Some(lender_balance),
        })
    }

    async fn decline(&self, request: BorrowRequest) -> Result<BorrowOutcome> {
        let updated = self.transition(request.id, BorrowStatus::Declined).await?;
        Ok(BorrowOutcome {
            request: updated,
            lender_balance: None,
        })
    }

    /// Conditional Pending -> terminal transition; losing the race after
    /// the pre-check means another resolver got there first.
    async fn transition(&self, request_id: Uuid, status: BorrowStatus) -> Result<BorrowRequest> {
        let updated = self
            .requests
            .update(
                Query::new().filter(move |request: &BorrowRequest| {
                    request.id == request_id && request.status == BorrowStatus::Pending
                }),
                patch(move |request: &mut BorrowRequest| request.status = status),
            )
            .await?;
        updated.into_iter().next().ok_or_else(|| {
            warn!(%request_id, "borrow request resolved concurrently");
            CoreError::conflict("Borrow request already resolved")
        })
    }
}
