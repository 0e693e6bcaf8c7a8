//! Community membership and user directory for the CHAS core.
//!
//! Wraps the membership and user tables behind role checks and grouped
//! member listings, with injectable TTL caches in front of the two reads
//! every request path repeats: "is this user a member" and "what is this
//! user's profile". Caches are owned by the directory instance, constructed
//! at service startup, so tests never share state through globals.

mod directory;
mod models;

pub use directory::CommunityDirectory;
pub use models::{GroupedMember, Member, User};
