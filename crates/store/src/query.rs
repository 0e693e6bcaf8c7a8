//! Query builder for equality-filtered, ordered, paged row selection.

use std::cmp::Ordering;
use std::sync::Arc;

type PredFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type OrderFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// A declarative row query: predicate, ordering, and paging.
///
/// Predicates compose conjunctively; callers express equality filters as
/// closures over the typed row.
pub struct Query<T> {
    predicates: Vec<PredFn<T>>,
    order: Option<OrderFn<T>>,
    descending: bool,
    limit: Option<usize>,
    offset: usize,
}

impl<T> Query<T> {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
            order: None,
            descending: false,
            limit: None,
            offset: 0,
        }
    }

    /// Add a filter; all filters must hold for a row to match
    pub fn filter<F>(mut self, pred: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(pred));
        self
    }

    /// Order rows by a key comparison
    pub fn order_by<F>(mut self, cmp: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(cmp));
        self
    }

    /// Reverse the ordering
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether a row satisfies every predicate
    pub fn matches(&self, row: &T) -> bool {
        self.predicates.iter().all(|pred| pred(row))
    }

    /// Sort, then apply offset and limit
    pub(crate) fn arrange(&self, mut rows: Vec<T>) -> Vec<T> {
        if let Some(order) = &self.order {
            let order = Arc::clone(order);
            if self.descending {
                rows.sort_by(|a, b| order(b, a));
            } else {
                rows.sort_by(|a, b| order(a, b));
            }
        }
        let tail: Vec<T> = rows.into_iter().skip(self.offset).collect();
        match self.limit {
            Some(limit) => tail.into_iter().take(limit).collect(),
            None => tail,
        }
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
            order: self.order.clone(),
            descending: self.descending,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
