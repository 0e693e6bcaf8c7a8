//! Bounded TTL cache for the CHAS core.
//!
//! Used to avoid redundant store reads of slow-changing facts (membership,
//! user profiles, whitelist status). The cache is never the source of truth:
//! all mutating operations go to the store of record first.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A bounded key-value cache with per-entry expiry.
///
/// Entries expire after their TTL and are evicted on read once stale. When
/// the map is at capacity, the oldest-inserted key is evicted before a new
/// key is added (insertion-order eviction, not LRU-on-read). A single lock
/// guards all operations, so the cache is safe under arbitrary concurrent
/// callers. Nothing is persisted; contents are lost on restart.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    // Insertion order as (seq, key) slots; slots whose seq no longer matches
    // the live entry are stale and skipped during eviction.
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

struct Entry<V> {
    seq: u64,
    expires_at: Instant,
    value: V,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Return the cached value unless it is absent or expired.
    ///
    /// Expired entries are removed as a side effect of the read.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite a value with the given TTL.
    ///
    /// A zero TTL makes this a no-op, which disables caching for callers
    /// configured with `ttl = 0`. An overwritten key keeps its original
    /// position in the eviction order.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let expires_at = Instant::now() + ttl;

        if let Some(existing) = inner.entries.get_mut(&key) {
            existing.expires_at = expires_at;
            existing.value = value;
            return;
        }

        while inner.entries.len() >= self.capacity {
            let Some((seq, oldest)) = inner.order.pop_front() else {
                break;
            };
            let live = inner
                .entries
                .get(&oldest)
                .map_or(false, |entry| entry.seq == seq);
            if live {
                inner.entries.remove(&oldest);
                break;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((seq, key.clone()));
        inner.entries.insert(
            key,
            Entry {
                seq,
                expires_at,
                value,
            },
        );
    }

    /// Remove a key, if present
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.remove(key).map(|entry| entry.value)
    }

    /// Number of live entries, counting those not yet evicted on read
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
        inner.order.clear();
    }
}
