//! In-memory reference implementation of the row store.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Patch, Query, StoreError, StoreResult, Table};

type KeyFn<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

struct UniqueIndex<T> {
    name: String,
    key: KeyFn<T>,
}

/// An in-memory table guarded by a single reader-writer lock.
///
/// Rows keep insertion order, so an unordered select returns them oldest
/// first, matching `created_at` ordering for append-only tables. Declared
/// unique indexes are enforced on insert; an index key of `None` exempts a
/// row, which allows partial indexes such as "one active election per
/// community".
pub struct MemTable<T> {
    rows: RwLock<Vec<T>>,
    uniques: Vec<UniqueIndex<T>>,
}

impl<T> MemTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            uniques: Vec::new(),
        }
    }

    /// Declare a unique index enforced on insert
    pub fn with_unique_index<F>(mut self, name: &str, key: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.uniques.push(UniqueIndex {
            name: name.to_string(),
            key: Arc::new(key),
        });
        self
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn check_uniques(&self, rows: &[T], candidate: &T) -> StoreResult<()> {
        for index in &self.uniques {
            let Some(key) = (index.key)(candidate) else {
                continue;
            };
            let taken = rows
                .iter()
                .any(|row| (index.key)(row).as_deref() == Some(key.as_str()));
            if taken {
                debug!(index = %index.name, "rejecting insert on unique index");
                return Err(StoreError::UniqueViolation(index.name.clone()));
            }
        }
        Ok(())
    }
}

impl<T> Default for MemTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Table<T> for MemTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn select_one(&self, query: Query<T>) -> StoreResult<Option<T>> {
        Ok(self.select_many(query.limit(1)).await?.into_iter().next())
    }

    async fn select_many(&self, query: Query<T>) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        let matched: Vec<T> = rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        Ok(query.arrange(matched))
    }

    async fn insert(&self, row: T) -> StoreResult<T> {
        let mut rows = self.rows.write().await;
        self.check_uniques(&rows, &row)?;
        rows.push(row.clone());
        Ok(row)
    }

    async fn insert_many(&self, batch: Vec<T>) -> StoreResult<Vec<T>> {
        let mut rows = self.rows.write().await;
        let mut staged: Vec<T> = Vec::with_capacity(batch.len());
        for row in batch {
            self.check_uniques(&rows, &row)?;
            // Also guard against duplicates within the batch itself.
            self.check_uniques(&staged, &row)?;
            staged.push(row);
        }
        rows.extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn update(&self, query: Query<T>, patch: Patch<T>) -> StoreResult<Vec<T>> {
        let mut rows = self.rows.write().await;
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if query.matches(row) {
                patch(row);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn count(&self, query: Query<T>) -> StoreResult<usize> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| query.matches(row)).count())
    }
}
