//! Moderator elections.
//!
//! A single active election per community at a time. Council members and
//! moderators vote once each for a candidate; closing tallies the votes
//! and breaks ties deterministically by the earliest first vote among the
//! tied leaders.

use std::collections::HashMap;
use std::sync::Arc;

use chas_community::{CommunityDirectory, GroupedMember};
use chas_core::error::{ALREADY_VOTED, ELECTION_CLOSED};
use chas_core::{CommunityId, CoreError, Result, Role, UserId};
use chas_store::{patch, Query, StoreError, TableRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Status of an election; Completed is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    Active,
    Completed,
}

/// A moderator election
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: Uuid,
    pub community_id: CommunityId,
    pub title: String,
    pub status: ElectionStatus,
    pub winner_id: Option<UserId>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One vote in an election; unique per (election, voter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionVote {
    pub election_id: Uuid,
    pub voter_id: UserId,
    pub candidate_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// An election hydrated with its candidate set and votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionView {
    pub election: Election,
    pub candidates: Vec<GroupedMember>,
    pub votes: Vec<ElectionVote>,
}

/// Manages the moderator election lifecycle.
pub struct ElectionEngine {
    elections: TableRef<Election>,
    votes: TableRef<ElectionVote>,
    directory: Arc<CommunityDirectory>,
}

impl ElectionEngine {
    pub fn new(
        elections: TableRef<Election>,
        votes: TableRef<ElectionVote>,
        directory: Arc<CommunityDirectory>,
    ) -> Self {
        Self {
            elections,
            votes,
            directory,
        }
    }

    /// Declare the unique index the vote table must enforce
    pub fn vote_index(vote: &ElectionVote) -> Option<String> {
        Some(format!("{}:{}", vote.election_id, vote.voter_id))
    }

    /// Declare the partial index enforcing one active election per community
    pub fn active_index(election: &Election) -> Option<String> {
        (election.status == ElectionStatus::Active).then(|| election.community_id.to_string())
    }

    /// The active election in a community, hydrated, if one exists
    pub async fn active(&self, community_id: CommunityId) -> Result<Option<ElectionView>> {
        let election = self
            .elections
            .select_one(
                Query::new()
                    .filter(move |election: &Election| {
                        election.community_id == community_id
                            && election.status == ElectionStatus::Active
                    })
                    .order_by(|a: &Election, b: &Election| a.created_at.cmp(&b.created_at))
                    .descending(),
            )
            .await?;
        match election {
            Some(election) => Ok(Some(self.hydrate(election).await?)),
            None => Ok(None),
        }
    }

    /// Create a new active election; moderators only
    pub async fn create(
        &self,
        actor_id: UserId,
        community_id: CommunityId,
        title: impl Into<String>,
        ends_at: DateTime<Utc>,
    ) -> Result<ElectionView> {
        self.directory
            .ensure_any_role(
                actor_id,
                community_id,
                &[Role::Moderator],
                "Only moderators can create elections",
            )
            .await?;

        if self.active(community_id).await?.is_some() {
            return Err(CoreError::conflict("An active election already exists"));
        }

        let insert = self
            .elections
            .insert(Election {
                id: Uuid::new_v4(),
                community_id,
                title: title.into(),
                status: ElectionStatus::Active,
                winner_id: None,
                ends_at,
                created_at: Utc::now(),
            })
            .await;
        let election = match insert {
            Ok(election) => election,
            // Two concurrent creators: the store's active index catches
            // what the pre-check missed.
            Err(StoreError::UniqueViolation(_)) => {
                return Err(CoreError::conflict("An active election already exists"));
            }
            Err(other) => return Err(other.into()),
        };

        info!(election_id = %election.id, %community_id, "election created");
        self.hydrate(election).await
    }

    /// Cast one vote for a candidate; council members and moderators only
    pub async fn vote(
        &self,
        actor_id: UserId,
        community_id: CommunityId,
        election_id: Uuid,
        candidate_id: UserId,
    ) -> Result<ElectionView> {
        self.directory
            .ensure_any_role(
                actor_id,
                community_id,
                &[Role::Council, Role::Moderator],
                "Only council members or moderators can vote",
            )
            .await?;

        let election = self.election(election_id, community_id).await?;
        if election.status != ElectionStatus::Active {
            return Err(CoreError::conflict_code(
                "Election is closed",
                ELECTION_CLOSED,
            ));
        }

        let candidates = self.candidates(community_id).await?;
        let eligible = candidates
            .iter()
            .any(|candidate| candidate.user_id == candidate_id);
        if !eligible {
            return Err(CoreError::not_found("Candidate"));
        }

        let existing = self
            .votes
            .select_one(Query::new().filter(move |vote: &ElectionVote| {
                vote.election_id == election_id && vote.voter_id == actor_id
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
            .insert(ElectionVote {
                election_id,
                voter_id: actor_id,
                candidate_id,
                created_at: Utc::now(),
            })
            .await;
        match insert {
            Ok(_) => {}
            Err(StoreError::UniqueViolation(_)) => {
                return Err(CoreError::conflict_code(
                    "You have already voted",
                    ALREADY_VOTED,
                ));
            }
            Err(other) => return Err(other.into()),
        }

        self.hydrate(election).await
    }

    /// Close the election, compute the winner, and grant the moderator
    /// role; moderators only.
    ///
    /// A no-op returning the unchanged election when already completed.
    pub async fn close(
        &self,
        actor_id: UserId,
        community_id: CommunityId,
        election_id: Uuid,
    ) -> Result<ElectionView> {
        self.directory
            .ensure_any_role(
                actor_id,
                community_id,
                &[Role::Moderator],
                "Only moderators can close elections",
            )
            .await?;

        let election = self.election(election_id, community_id).await?;
        if election.status != ElectionStatus::Active {
            return self.hydrate(election).await;
        }

        let votes = self.votes_for(election_id).await?;
        let winner_id = tally_winner(&votes);

        let closed = self
            .elections
            .update(
                Query::new().filter(move |election: &Election| {
                    election.id == election_id && election.status == ElectionStatus::Active
                }),
                patch(move |election: &mut Election| {
                    election.status = ElectionStatus::Completed;
                    election.winner_id = winner_id;
                }),
            )
            .await?;
        let Some(updated) = closed.into_iter().next() else {
            // Lost the close race; report whatever the winner wrote.
            debug!(%election_id, "election closed concurrently");
            let election = self.election(election_id, community_id).await?;
            return self.hydrate(election).await;
        };

        if let Some(winner_id) = winner_id {
            self.directory
                .grant_role(winner_id, community_id, Role::Moderator)
                .await?;
            info!(%election_id, %winner_id, "election closed, moderator granted");
        } else {
            info!(%election_id, "election closed with no votes");
        }

        self.hydrate(updated).await
    }

    /// All votes in an election, oldest first
    pub async fn votes_for(&self, election_id: Uuid) -> Result<Vec<ElectionVote>> {
        Ok(self
            .votes
            .select_many(
                Query::new()
                    .filter(move |vote: &ElectionVote| vote.election_id == election_id)
                    .order_by(|a: &ElectionVote, b: &ElectionVote| a.created_at.cmp(&b.created_at)),
            )
            .await?)
    }

    /// Members eligible to stand: council members and moderators, with
    /// profiles attached
    pub async fn candidates(&self, community_id: CommunityId) -> Result<Vec<GroupedMember>> {
        let members = self.directory.members_grouped(community_id).await?;
        let mut candidates: Vec<GroupedMember> = members
            .into_iter()
            .filter(GroupedMember::is_candidate)
            .collect();

        let ids: Vec<UserId> = candidates.iter().map(|member| member.user_id).collect();
        let users = self.directory.users_map(&ids).await?;
        for candidate in &mut candidates {
            candidate.user = users.get(&candidate.user_id).cloned();
        }
        Ok(candidates)
    }

    async fn election(&self, election_id: Uuid, community_id: CommunityId) -> Result<Election> {
        self.elections
            .select_one(Query::new().filter(move |election: &Election| {
                election.id == election_id && election.community_id == community_id
            }))
            .await?
            .ok_or_else(|| CoreError::not_found("Election"))
    }

    async fn hydrate(&self, election: Election) -> Result<ElectionView> {
        let candidates = self.candidates(election.community_id).await?;
        let votes = self.votes_for(election.id).await?;
        Ok(ElectionView {
            election,
            candidates,
            votes,
        })
    }
}

/// Winner = candidate with the strict maximum vote count; ties go to the
/// tied candidate whose first vote was cast earliest. No votes, no winner.
fn tally_winner(votes: &[ElectionVote]) -> Option<UserId> {
    if votes.is_empty() {
        return None;
    }

    let mut counts: HashMap<UserId, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.candidate_id).or_insert(0) += 1;
    }
    let max_votes = counts.values().copied().max()?;
    let tied: Vec<UserId> = counts
        .iter()
        .filter(|(_, count)| **count == max_votes)
        .map(|(candidate, _)| *candidate)
        .collect();
    if tied.len() == 1 {
        return tied.into_iter().next();
    }

    // Votes arrive oldest first; the first position a tied candidate
    // appears at decides the tie.
    votes
        .iter()
        .find(|vote| tied.contains(&vote.candidate_id))
        .map(|vote| vote.candidate_id)
}
