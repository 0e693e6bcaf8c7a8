//! Membership directory service.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chas_cache::TtlCache;
use chas_core::{CommunityId, CoreError, Result, Role, Settings, UserId};
use chas_store::{Query, TableRef};
use chrono::Utc;
use tracing::debug;

use crate::models::{GroupedMember, Member, User};

/// Role and membership lookups over the store of record, fronted by
/// bounded TTL caches.
pub struct CommunityDirectory {
    users: TableRef<User>,
    members: TableRef<Member>,
    membership_cache: TtlCache<(UserId, CommunityId), bool>,
    user_cache: TtlCache<UserId, User>,
    membership_ttl: Duration,
    user_ttl: Duration,
}

impl CommunityDirectory {
    pub fn new(users: TableRef<User>, members: TableRef<Member>, settings: &Settings) -> Self {
        let capacity = settings.cache_capacity();
        Self {
            users,
            members,
            membership_cache: TtlCache::new(capacity),
            user_cache: TtlCache::new(capacity),
            membership_ttl: settings.membership_cache_ttl,
            user_ttl: settings.user_cache_ttl,
        }
    }

    /// Return a public user record, from cache when fresh
    pub async fn user(&self, user_id: UserId) -> Result<User> {
        if let Some(user) = self.user_cache.get(&user_id) {
            return Ok(user);
        }

        let user = self
            .users
            .select_one(Query::new().filter(move |user: &User| user.id == user_id))
            .await?
            .ok_or_else(|| CoreError::not_found("User"))?;
        self.user_cache.insert(user_id, user.clone(), self.user_ttl);
        Ok(user)
    }

    /// Fetch several users as an id-keyed map, batching the cache misses
    pub async fn users_map(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, User>> {
        let distinct: HashSet<UserId> = user_ids.iter().copied().collect();
        let mut result = HashMap::new();
        let mut missing: HashSet<UserId> = HashSet::new();
        for user_id in distinct {
            match self.user_cache.get(&user_id) {
                Some(user) => {
                    result.insert(user_id, user);
                }
                None => {
                    missing.insert(user_id);
                }
            }
        }

        if !missing.is_empty() {
            let fetched = self
                .users
                .select_many(Query::new().filter(move |user: &User| missing.contains(&user.id)))
                .await?;
            for user in fetched {
                self.user_cache.insert(user.id, user.clone(), self.user_ttl);
                result.insert(user.id, user);
            }
        }

        Ok(result)
    }

    /// Whether the user belongs to the community in any role
    pub async fn is_member(&self, user_id: UserId, community_id: CommunityId) -> Result<bool> {
        let key = (user_id, community_id);
        if let Some(cached) = self.membership_cache.get(&key) {
            return Ok(cached);
        }

        let found = self
            .members
            .select_one(Query::new().filter(move |member: &Member| {
                member.user_id == user_id && member.community_id == community_id
            }))
            .await?
            .is_some();
        self.membership_cache.insert(key, found, self.membership_ttl);
        Ok(found)
    }

    /// Seed or override the membership cache for immediate follow-up reads
    pub fn seed_membership(&self, user_id: UserId, community_id: CommunityId, is_member: bool) {
        self.membership_cache
            .insert((user_id, community_id), is_member, self.membership_ttl);
    }

    /// Fail with `Forbidden` when the user is not in the community
    pub async fn ensure_member(&self, user_id: UserId, community_id: CommunityId) -> Result<()> {
        if self.is_member(user_id, community_id).await? {
            Ok(())
        } else {
            Err(CoreError::forbidden(
                "You are not a member of this community",
            ))
        }
    }

    /// All roles the user holds in the community, highest priority first
    pub async fn roles(&self, user_id: UserId, community_id: CommunityId) -> Result<Vec<Role>> {
        let rows = self
            .members
            .select_many(Query::new().filter(move |member: &Member| {
                member.user_id == user_id && member.community_id == community_id
            }))
            .await?;
        let mut roles: Vec<Role> = rows.into_iter().map(|member| member.role).collect();
        roles.sort_by_key(Role::priority);
        Ok(roles)
    }

    /// Fail with `Forbidden` unless the user holds one of `required`
    pub async fn ensure_any_role(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        required: &[Role],
        reason: &str,
    ) -> Result<()> {
        let held = self.roles(user_id, community_id).await?;
        if held.iter().any(|role| required.contains(role)) {
            Ok(())
        } else {
            Err(CoreError::forbidden(reason))
        }
    }

    /// Community members grouped by user, roles aggregated, ordered by the
    /// earliest join time
    pub async fn members_grouped(&self, community_id: CommunityId) -> Result<Vec<GroupedMember>> {
        let rows = self
            .members
            .select_many(
                Query::new().filter(move |member: &Member| member.community_id == community_id),
            )
            .await?;

        let mut grouped: HashMap<UserId, GroupedMember> = HashMap::new();
        for row in rows {
            let entry = grouped.entry(row.user_id).or_insert_with(|| GroupedMember {
                user_id: row.user_id,
                community_id: row.community_id,
                roles: Vec::new(),
                joined_at: row.joined_at,
                user: None,
            });
            entry.roles.push(row.role);
            if row.joined_at < entry.joined_at {
                entry.joined_at = row.joined_at;
            }
        }

        let mut members: Vec<GroupedMember> = grouped.into_values().collect();
        for member in &mut members {
            member.roles.sort_by_key(Role::priority);
        }
        members.sort_by_key(|member| member.joined_at);
        Ok(members)
    }

    /// Number of distinct members in the community
    pub async fn member_count(&self, community_id: CommunityId) -> Result<usize> {
        let rows = self
            .members
            .select_many(
                Query::new().filter(move |member: &Member| member.community_id == community_id),
            )
            .await?;
        let distinct: HashSet<UserId> = rows.into_iter().map(|member| member.user_id).collect();
        Ok(distinct.len())
    }

    /// Grant a role unless the user already holds it (additive)
    pub async fn grant_role(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        role: Role,
    ) -> Result<()> {
        let existing = self
            .members
            .select_one(Query::new().filter(move |member: &Member| {
                member.user_id == user_id && member.community_id == community_id && member.role == role
            }))
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        debug!(%user_id, %community_id, %role, "granting role");
        self.members
            .insert(Member {
                user_id,
                community_id,
                role,
                joined_at: Utc::now(),
            })
            .await?;
        self.seed_membership(user_id, community_id, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chas_core::Settings;
    use chas_store::MemTable;
    use std::sync::Arc;
    use uuid::Uuid;

    fn directory() -> (CommunityDirectory, TableRef<User>, TableRef<Member>) {
        let users: TableRef<User> = Arc::new(MemTable::new());
        let members: TableRef<Member> = Arc::new(MemTable::new());
        let directory =
            CommunityDirectory::new(Arc::clone(&users), Arc::clone(&members), &Settings::default());
        (directory, users, members)
    }

    async fn add_member(
        members: &TableRef<Member>,
        user_id: UserId,
        community_id: CommunityId,
        role: Role,
    ) {
        members
            .insert(Member {
                user_id,
                community_id,
                role,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn roles_sorted_by_priority() {
        let (directory, _users, members) = directory();
        let user = Uuid::new_v4();
        let community = Uuid::new_v4();
        add_member(&members, user, community, Role::Member).await;
        add_member(&members, user, community, Role::Moderator).await;

        let roles = directory.roles(user, community).await.unwrap();
        assert_eq!(roles, vec![Role::Moderator, Role::Member]);
    }

    #[tokio::test]
    async fn ensure_any_role_rejects_outsiders() {
        let (directory, _users, members) = directory();
        let user = Uuid::new_v4();
        let community = Uuid::new_v4();
        add_member(&members, user, community, Role::Member).await;

        let err = directory
            .ensure_any_role(user, community, &[Role::Moderator], "moderators only")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        directory
            .ensure_any_role(user, community, &[Role::Member], "members only")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn grouped_members_aggregate_roles_and_earliest_join() {
        let (directory, _users, members) = directory();
        let community = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let early = Utc::now() - chrono::Duration::days(2);
        members
            .insert(Member {
                user_id: alice,
                community_id: community,
                role: Role::Member,
                joined_at: early,
            })
            .await
            .unwrap();
        add_member(&members, alice, community, Role::Council).await;
        add_member(&members, bob, community, Role::Member).await;

        let grouped = directory.members_grouped(community).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].user_id, alice);
        assert_eq!(grouped[0].joined_at, early);
        assert_eq!(grouped[0].roles, vec![Role::Council, Role::Member]);
        assert_eq!(directory.member_count(community).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn membership_is_cached_and_seedable() {
        let (directory, _users, members) = directory();
        let user = Uuid::new_v4();
        let community = Uuid::new_v4();

        assert!(!directory.is_member(user, community).await.unwrap());

        // The negative result is cached; a direct insert is invisible until
        // the cache is seeded or expires.
        add_member(&members, user, community, Role::Member).await;
        assert!(!directory.is_member(user, community).await.unwrap());

        directory.seed_membership(user, community, true);
        assert!(directory.is_member(user, community).await.unwrap());
    }

    #[tokio::test]
    async fn grant_role_is_additive_and_idempotent() {
        let (directory, _users, members) = directory();
        let user = Uuid::new_v4();
        let community = Uuid::new_v4();
        add_member(&members, user, community, Role::Council).await;

        directory
            .grant_role(user, community, Role::Moderator)
            .await
            .unwrap();
        directory
            .grant_role(user, community, Role::Moderator)
            .await
            .unwrap();

        let roles = directory.roles(user, community).await.unwrap();
        assert_eq!(roles, vec![Role::Moderator, Role::Council]);
    }

    #[tokio::test]
    async fn users_map_fetches_misses_in_one_pass() {
        let (directory, users, _members) = directory();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for (id, name) in [(a, "ada"), (b, "grace")] {
            users
                .insert(User {
                    id,
                    display_name: name.to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let map = directory.users_map(&[a, b, a]).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&a].display_name, "ada");

        // Second call is served from cache.
        let map = directory.users_map(&[a, b]).await.unwrap();
        assert_eq!(map.len(), 2);
    }
}
