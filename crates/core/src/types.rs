//! Identifier and role types shared across the CHAS crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a user
pub type UserId = Uuid;

/// Identifier of a community
pub type CommunityId = Uuid;

/// Role a user holds within a community.
///
/// A user may hold several role rows at once; display and permission checks
/// use the priority ordering Moderator < Council < Member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Council,
    Member,
}

impl Role {
    /// Display priority, lower sorts first
    pub fn priority(&self) -> u8 {
        match self {
            Role::Moderator => 0,
            Role::Council => 1,
            Role::Member => 2,
        }
    }

    /// Roles eligible to stand in a moderator election
    pub fn is_candidate(&self) -> bool {
        matches!(self, Role::Moderator | Role::Council)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Council => "council",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moderator" => Ok(Role::Moderator),
            "council" => Ok(Role::Council),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_priority_orders_moderator_first() {
        let mut roles = vec![Role::Member, Role::Moderator, Role::Council];
        roles.sort_by_key(Role::priority);
        assert_eq!(roles, vec![Role::Moderator, Role::Council, Role::Member]);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Moderator, Role::Council, Role::Member] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("chancellor".parse::<Role>().is_err());
    }
}
