//! Error taxonomy for the CHAS core.
//!
//! All engines surface these errors verbatim to the request layer; mapping
//! to transport status codes is the caller's responsibility.

use std::result;
use thiserror::Error;

/// Common result type used throughout CHAS
pub type Result<T> = result::Result<T, CoreError>;

/// Conflict code for a duplicate vote on a proposal or election
pub const ALREADY_VOTED: &str = "ALREADY_VOTED";
/// Conflict code for a vote against a closed election
pub const ELECTION_CLOSED: &str = "ELECTION_CLOSED";
/// Conflict code for a vote against an inactive or overdue proposal
pub const PROPOSAL_EXPIRED: &str = "PROPOSAL_EXPIRED";

/// Common error type for CHAS core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Entity lookup failed
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed or rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Role or membership requirement not met
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State conflict, optionally carrying a machine-readable code
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        code: Option<&'static str>,
    },

    /// Spend or transfer exceeds the remaining balance
    #[error("Insufficient CC: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// Backend store failure the core does not retry
    #[error("Store error: {0}")]
    Store(String),
}

impl CoreError {
    /// Create a new not found error
    pub fn not_found<S: Into<String>>(label: S) -> Self {
        CoreError::NotFound(label.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    /// Create a new forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        CoreError::Forbidden(msg.into())
    }

    /// Create a new conflict error without a code
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        CoreError::Conflict {
            message: msg.into(),
            code: None,
        }
    }

    /// Create a new conflict error with a machine-readable code
    pub fn conflict_code<S: Into<String>>(msg: S, code: &'static str) -> Self {
        CoreError::Conflict {
            message: msg.into(),
            code: Some(code),
        }
    }

    /// The conflict code, when this is a coded conflict
    pub fn code(&self) -> Option<&'static str> {
        match self {
            CoreError::Conflict { code, .. } => *code,
            _ => None,
        }
    }
}
