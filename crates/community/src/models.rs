//! Membership and user rows.

use chas_core::{CommunityId, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A public user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// One role a user holds in one community.
///
/// A user with several roles has several rows; membership in any role
/// counts as community membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// A community member with all roles aggregated.
///
/// `joined_at` is the earliest join time across the user's role rows;
/// roles are sorted by display priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedMember {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub roles: Vec<Role>,
    pub joined_at: DateTime<Utc>,
    /// Attached profile, when the caller asked for hydration
    pub user: Option<User>,
}

impl GroupedMember {
    /// Whether the member is eligible to stand in a moderator election
    pub fn is_candidate(&self) -> bool {
        self.roles.iter().any(Role::is_candidate)
    }
}
