//! Common types, errors, and configuration for the CHAS core.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Settings;
pub use error::{CoreError, Result};
pub use types::{CommunityId, Role, UserId};
