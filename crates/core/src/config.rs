//! Environment variable-based configuration for CHAS.
//!
//! Values are read from `CHAS_`-prefixed environment variables, falling back
//! to coded defaults when a variable is absent or fails to parse.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for CHAS configuration
pub const ENV_PREFIX: &str = "CHAS_";

/// Runtime settings for the CHAS core
#[derive(Debug, Clone)]
pub struct Settings {
    /// Daily CC budget assigned to newly created balances
    pub default_daily_budget: i64,
    /// Minimum stake for a tip-to-tip proposal
    pub min_tip_stake: i64,
    /// Hours from creation to a tip-to-tip proposal deadline
    pub proposal_lifetime_hours: i64,
    /// TTL for cached community membership checks
    pub membership_cache_ttl: Duration,
    /// TTL for cached user profiles
    pub user_cache_ttl: Duration,
    /// TTL for cached invite whitelist checks
    pub whitelist_cache_ttl: Duration,
    /// Capacity ceiling for each data cache (floored to 100)
    pub cache_max_entries: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_daily_budget: 100,
            min_tip_stake: 50,
            proposal_lifetime_hours: 24,
            membership_cache_ttl: Duration::from_secs(20),
            user_cache_ttl: Duration::from_secs(30),
            whitelist_cache_ttl: Duration::from_secs(300),
            cache_max_entries: 5000,
        }
    }
}

impl Settings {
    /// Load settings from environment variables over the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_daily_budget: parse_env("DEFAULT_DAILY_BUDGET", defaults.default_daily_budget),
            min_tip_stake: parse_env("MIN_TIP_STAKE", defaults.min_tip_stake),
            proposal_lifetime_hours: parse_env(
                "PROPOSAL_LIFETIME_HOURS",
                defaults.proposal_lifetime_hours,
            ),
            membership_cache_ttl: Duration::from_secs(parse_env(
                "MEMBERSHIP_CACHE_TTL_SECONDS",
                defaults.membership_cache_ttl.as_secs(),
            )),
            user_cache_ttl: Duration::from_secs(parse_env(
                "USER_CACHE_TTL_SECONDS",
                defaults.user_cache_ttl.as_secs(),
            )),
            whitelist_cache_ttl: Duration::from_secs(parse_env(
                "WHITELIST_CACHE_TTL_SECONDS",
                defaults.whitelist_cache_ttl.as_secs(),
            )),
            cache_max_entries: parse_env("DATA_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
        }
    }

    /// Cache capacity with the 100-entry floor applied
    pub fn cache_capacity(&self) -> usize {
        self.cache_max_entries.max(100)
    }
}

/// Parse an environment variable with the CHAS prefix
fn parse_env<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    let env_key = format!("{}{}", ENV_PREFIX, key);
    match env::var(&env_key) {
        Ok(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse env variable {}: {}", env_key, e);
                default
            }
        },
        Err(_) => default,
    }
}
