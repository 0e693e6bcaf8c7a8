//! Tip-to-tip escrow proposals.
//!
//! A proposer stakes CC which is spent immediately and held in escrow while
//! every community member votes. Unanimous acceptance before the deadline
//! refunds the stake; any decline, or the deadline passing, forfeits it.

use std::sync::Arc;

use chas_community::CommunityDirectory;
use chas_core::error::{ALREADY_VOTED, PROPOSAL_EXPIRED};
use chas_core::{CommunityId, CoreError, Result, Settings, UserId};
use chas_ledger::{Balance, CreditEngine, EntryKind, LedgerBook};
use chas_store::{patch, Query, StoreError, TableRef};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Status of a tip-to-tip proposal; Completed and Expired are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Active,
    Completed,
    Expired,
}

/// A member's position on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Accept,
    Decline,
}

/// An escrow-backed group proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipToTipProposal {
    pub id: Uuid,
    pub proposer_id: UserId,
    pub community_id: CommunityId,
    pub title: String,
    pub description: String,
    pub stake_amount: i64,
    pub deadline: DateTime<Utc>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

/// One vote on a proposal; unique per (proposal, user)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalVote {
    pub proposal_id: Uuid,
    pub user_id: UserId,
    pub vote: VoteChoice,
    pub created_at: DateTime<Utc>,
}

/// A proposal together with its votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalView {
    pub proposal: TipToTipProposal,
    pub votes: Vec<ProposalVote>,
}

/// How a vote resolved the proposal, when it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOutcome {
    Completed,
    Expired,
}

/// Creates, votes on, resolves, and expires tip-to-tip proposals.
pub struct TipToTipEngine {
    proposals: TableRef<TipToTipProposal>,
    votes: TableRef<ProposalVote>,
    credit: CreditEngine,
    book: LedgerBook,
    directory: Arc<CommunityDirectory>,
    min_stake: i64,
    lifetime: Duration,
}

impl TipToTipEngine {
    pub fn new(
        proposals: TableRef<TipToTipProposal>,
        votes: TableRef<ProposalVote>,
        credit: CreditEngine,
        book: LedgerBook,
        directory: Arc<CommunityDirectory>,
        settings: &Settings,
    ) -> Self {
        Self {
            proposals,
            votes,
            credit,
            book,
            directory,
            min_stake: settings.min_tip_stake,
            lifetime: Duration::hours(settings.proposal_lifetime_hours),
        }
    }

    /// Declare the unique index the vote table must enforce
    pub fn vote_index(vote: &ProposalVote) -> Option<String> {
        Some(format!("{}:{}", vote.proposal_id, vote.user_id))
    }

    /// One proposal with its votes, optionally scoped to a community
    pub async fn get(
        &self,
        proposal_id: Uuid,
        community_id: Option<CommunityId>,
    ) -> Result<ProposalView> {
        let proposal = self
            .proposals
            .select_one(Query::new().filter(move |proposal: &TipToTipProposal| {
                proposal.id == proposal_id
                    && community_id.map_or(true, |community| proposal.community_id == community)
            }))
            .await?
            .ok_or_else(|| CoreError::not_found("Tip-to-tip proposal"))?;
        let votes = self.votes_for(proposal_id).await?;
        Ok(ProposalView { proposal, votes })
    }

    /// All votes on a proposal, oldest first
    pub async fn votes_for(&self, proposal_id: Uuid) -> Result<Vec<ProposalVote>> {
        Ok(self
            .votes
            .select_many(
                Query::new()
                    .filter(move |vote: &ProposalVote| vote.proposal_id == proposal_id)
                    .order_by(|a: &ProposalVote, b: &ProposalVote| a.created_at.cmp(&b.created_at)),
            )
            .await?)
    }

    /// Create an active proposal, spending the stake into escrow and
    /// auto-casting the proposer's accept vote
    pub async fn create(
        &self,
        proposer_id: UserId,
        community_id: CommunityId,
        title: impl Into<String>,
        description: impl Into<String>,
        stake_amount: i64,
    ) -> Result<(ProposalView, Balance)> {
        if stake_amount < self.min_stake {
            return Err(CoreError::invalid_input(format!(
                "Tip-to-tip stake must be at least {} CC",
                self.min_stake
            )));
        }

        self.directory.ensure_member(proposer_id, community_id).await?;
        // The stake is deducted up front; failure here blocks creation.
        let balance = self
            .credit
            .spend(proposer_id, community_id, stake_amount)
            .await?;

        let title = title.into();
        let proposal = self
            .proposals
            .insert(TipToTipProposal {
                id: Uuid::new_v4(),
                proposer_id,
                community_id,
                title: title.clone(),
                description: description.into(),
                stake_amount,
                deadline: Utc::now() + self.lifetime,
                status: ProposalStatus::Active,
                created_at: Utc::now(),
            })
            .await?;

        self.votes
            .insert(ProposalVote {
                proposal_id: proposal.id,
                user_id: proposer_id,
                vote: VoteChoice::Accept,
                created_at: Utc::now(),
            })
            .await?;

        self.book
            .record(
                proposer_id,
                community_id,
                EntryKind::TipToTip,
                -stake_amount,
                format!("Proposed Tip-to-Tip '{}'", title),
                Some(proposal.id),
            )
            .await?;

        info!(proposal_id = %proposal.id, %proposer_id, stake_amount, "tip-to-tip created");
        let votes = self.votes_for(proposal.id).await?;
        Ok((ProposalView { proposal, votes }, balance))
    }

    /// Cast a vote; resolves the proposal when every member has voted.
    ///
    /// Returns the refreshed view and the outcome when this vote resolved
    /// the proposal.
    pub async fn vote(
        &self,
        proposal_id: Uuid,
        community_id: CommunityId,
        voter_id: UserId,
        choice: VoteChoice,
    ) -> Result<(ProposalView, Option<ProposalOutcome>)> {
        let view = self.get(proposal_id, Some(community_id)).await?;
        if view.proposal.status != ProposalStatus::Active {
            return Err(CoreError::conflict_code(
                "Proposal is not active",
                PROPOSAL_EXPIRED,
            ));
        }
        if Utc::now() > view.proposal.deadline {
            // Flip to expired as a side effect; voting never revives it.
            self.transition(proposal_id, ProposalStatus::Expired).await?;
            return Err(CoreError::conflict_code(
                "Proposal deadline passed",
                PROPOSAL_EXPIRED,
            ));
        }

        self.directory.ensure_member(voter_id, community_id).await?;
        let existing = self
            .votes
            .select_one(Query::new().filter(move |vote: &ProposalVote| {
                vote.proposal_id == proposal_id && vote.user_id == voter_id
            }))
            .await?;
        if existing.is_some() {
            return Err(CoreError::conflict_code(
                "You have already voted",
                ALREADY_VOTED,
            ));
        }

        let insert = self
            .votes
            .insert(ProposalVote {
                proposal_id,
                user_id: voter_id,
                vote: choice,
                created_at: Utc::now(),
            })
            .await;
        match insert {
            Ok(_) => {}
            // A racing duplicate from the same user surfaces as the same
            // conflict as the pre-check.
            Err(StoreError::UniqueViolation(_)) => {
                return Err(CoreError::conflict_code(
                    "You have already voted",
                    ALREADY_VOTED,
                ));
            }
            Err(other) => return Err(other.into()),
        }

        let outcome = self.resolve_if_complete(proposal_id, community_id).await?;
        let updated = self.get(proposal_id, Some(community_id)).await?;
        Ok((updated, outcome))
    }

    /// Resolve the proposal once all members have voted.
    ///
    /// Concurrent final voters may both reach this; the conditional
    /// Active -> terminal update picks a single winner, and only the
    /// winner refunds the stake.
    pub(crate) async fn resolve_if_complete(
        &self,
        proposal_id: Uuid,
        community_id: CommunityId,
    ) -> Result<Option<ProposalOutcome>> {
        let view = self.get(proposal_id, Some(community_id)).await?;
        let total_members = self.directory.member_count(community_id).await?;
        if view.votes.len() < total_members {
            return Ok(None);
        }

        let declined = view
            .votes
            .iter()
            .any(|vote| vote.vote == VoteChoice::Decline);
        if declined {
            // Stake is forfeited: the cost of dissent.
            let flipped = self.transition(proposal_id, ProposalStatus::Expired).await?;
            return Ok(flipped.then_some(ProposalOutcome::Expired));
        }

        if !self.transition(proposal_id, ProposalStatus::Completed).await? {
            debug!(%proposal_id, "proposal resolved by a concurrent voter");
            return Ok(None);
        }

        self.credit
            .refund(
                view.proposal.proposer_id,
                community_id,
                view.proposal.stake_amount,
            )
            .await?;
        self.book
            .record(
                view.proposal.proposer_id,
                community_id,
                EntryKind::TipToTip,
                view.proposal.stake_amount,
                format!(
                    "Tip-to-Tip '{}' unanimously accepted - stake refunded",
                    view.proposal.title
                ),
                Some(proposal_id),
            )
            .await?;
        info!(%proposal_id, "tip-to-tip completed, stake refunded");
        Ok(Some(ProposalOutcome::Completed))
    }

    /// Expire every active proposal whose deadline has passed.
    ///
    /// Idempotent: a second sweep finds nothing. The stake is not
    /// refunded. Returns the affected rows for downstream notification.
    pub async fn expire_overdue(&self) -> Result<Vec<TipToTipProposal>> {
        let now = Utc::now();
        let expired = self
            .proposals
            .update(
                Query::new().filter(move |proposal: &TipToTipProposal| {
                    proposal.status == ProposalStatus::Active && proposal.deadline < now
                }),
                patch(|proposal: &mut TipToTipProposal| proposal.status = ProposalStatus::Expired),
            )
            .await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue tip-to-tip proposals");
        }
        Ok(expired)
    }

    /// Conditional Active -> terminal transition; true when this call
    /// performed it
    async fn transition(&self, proposal_id: Uuid, status: ProposalStatus) -> Result<bool> {
        let updated = self
            .proposals
            .update(
                Query::new().filter(move |proposal: &TipToTipProposal| {
                    proposal.id == proposal_id && proposal.status == ProposalStatus::Active
                }),
                patch(move |proposal: &mut TipToTipProposal| proposal.status = status),
            )
            .await?;
        Ok(!updated.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chas_community::{Member, User};
    use chas_core::Role;
    use chas_ledger::LedgerEntry;
    use chas_store::MemTable;

    // Resolution must survive being reached twice, as two concurrent final
    // voters would. Only the transition winner refunds.
    #[tokio::test]
    async fn double_resolution_refunds_once() {
        let balances: TableRef<Balance> = MemTable::new().into_ref();
        let entries: TableRef<LedgerEntry> = MemTable::new().into_ref();
        let proposals: TableRef<TipToTipProposal> = MemTable::new().into_ref();
        let votes: TableRef<ProposalVote> =
            MemTable::new().with_unique_index("vote_per_user", TipToTipEngine::vote_index).into_ref();
        let users: TableRef<User> = MemTable::new().into_ref();
        let members: TableRef<Member> = MemTable::new().into_ref();

        let settings = Settings::default();
        let credit = CreditEngine::new(Arc::clone(&balances));
        let book = LedgerBook::new(Arc::clone(&entries), Arc::clone(&balances));
        let directory = Arc::new(CommunityDirectory::new(
            Arc::clone(&users),
            Arc::clone(&members),
            &settings,
        ));
        let engine = TipToTipEngine::new(
            proposals,
            Arc::clone(&votes),
            credit.clone(),
            book,
            directory,
            &settings,
        );

        let community = Uuid::new_v4();
        let proposer = Uuid::new_v4();
        let other = Uuid::new_v4();
        for (user_id, name) in [(proposer, "proposer"), (other, "other")] {
            users
                .insert(User {
                    id: user_id,
                    display_name: name.to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
            members
                .insert(Member {
                    user_id,
                    community_id: community,
                    role: Role::Member,
                    joined_at: Utc::now(),
                })
                .await
                .unwrap();
            credit.ensure_balance(user_id, community, 200).await.unwrap();
        }

        let (view, _) = engine
            .create(proposer, community, "picnic", "a picnic", 100)
            .await
            .unwrap();
        votes
            .insert(ProposalVote {
                proposal_id: view.proposal.id,
                user_id: other,
                vote: VoteChoice::Accept,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let first = engine
            .resolve_if_complete(view.proposal.id, community)
            .await
            .unwrap();
        assert_eq!(first, Some(ProposalOutcome::Completed));
        let second = engine
            .resolve_if_complete(view.proposal.id, community)
            .await
            .unwrap();
        assert_eq!(second, None);

        let balance = credit.balance(proposer, community).await.unwrap();
        assert_eq!(balance.remaining, 200);
    }
}
