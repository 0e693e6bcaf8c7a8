//! Generic row-store interface for the CHAS core.
//!
//! The core treats its backing database as an external collaborator offering
//! row-at-a-time reads and writes: equality-filtered selects with ordering
//! and paging, inserts that surface unique-index violations as a structured
//! error, and conditional updates that return the rows they matched. The
//! conditional update is the only atomicity primitive the engines rely on;
//! a status transition conditioned on the prior status is a compare-and-swap.
//!
//! [`MemTable`] is the in-process reference implementation, used directly by
//! the test suites and suitable for single-node deployments.

mod memory;
mod query;

pub use memory::MemTable;
pub use query::Query;

use async_trait::async_trait;
use chas_core::CoreError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Mutation applied to every row matched by a conditional update
pub type Patch<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Errors surfaced by a row store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// A declared unique index rejected the write
    #[error("unique index violated: {0}")]
    UniqueViolation(String),

    /// Any other backend failure; never retried inside the core
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            // Engines that expect duplicates intercept this before it
            // reaches the generic mapping.
            StoreError::UniqueViolation(msg) => CoreError::invalid_input(msg),
            StoreError::Backend(msg) => CoreError::Store(msg),
        }
    }
}

/// A typed table of rows.
///
/// All methods are `&self`; implementations must be safe to share across
/// concurrent request handlers and background jobs.
#[async_trait]
pub trait Table<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// First row matching the query, if any
    async fn select_one(&self, query: Query<T>) -> StoreResult<Option<T>>;

    /// All rows matching the query, ordered and paged
    async fn select_many(&self, query: Query<T>) -> StoreResult<Vec<T>>;

    /// Insert one row, enforcing declared unique indexes
    async fn insert(&self, row: T) -> StoreResult<T>;

    /// Insert many rows; fails atomically on the first violation
    async fn insert_many(&self, rows: Vec<T>) -> StoreResult<Vec<T>>;

    /// Patch every row matching the query and return the updated rows.
    ///
    /// An empty return means the condition matched nothing; callers use
    /// this to detect a lost compare-and-swap race.
    async fn update(&self, query: Query<T>, patch: Patch<T>) -> StoreResult<Vec<T>>;

    /// Number of rows matching the query (paging is ignored)
    async fn count(&self, query: Query<T>) -> StoreResult<usize>;
}

/// Shared handle to a table
pub type TableRef<T> = Arc<dyn Table<T>>;

/// Box a closure as a [`Patch`]
pub fn patch<T, F>(f: F) -> Patch<T>
where
    F: Fn(&mut T) + Send + Sync + 'static,
{
    Arc::new(f)
}
