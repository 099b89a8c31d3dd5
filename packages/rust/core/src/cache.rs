//! Per-entry expiring cache.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use hybridci_shared::Result;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Position of the key's first insertion; keeps listing order stable.
    seq: u64,
}

/// Map whose entries each go stale `ttl` after they were last written.
///
/// Expired entries stay in the map (so a refresh can see the previous value)
/// until [`TtlCache::purge_expired`] or an overwrite removes them, but every
/// read treats them as absent.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
    next_seq: u64,
    last_write: Option<Instant>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            next_seq: 0,
            last_write: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace `key`, restarting its clock.
    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.last_write = Some(now);

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    /// The value for `key` if it is still fresh.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| &entry.value)
    }

    /// The value for `key` whether or not it has expired.
    pub fn peek_stale(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Return the fresh value for `key`, or run `refresh` and cache its result.
    ///
    /// `refresh` receives the expired value (if any) so it can carry state
    /// forward. When it yields `None` the stale entry is dropped.
    pub async fn get_or_refresh<F, Fut>(&mut self, key: K, refresh: F) -> Result<Option<V>>
    where
        F: FnOnce(Option<V>) -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(Some(value.clone()));
        }

        let stale = self.peek_stale(&key).cloned();
        match refresh(stale).await? {
            Some(value) => {
                self.insert(key, value.clone());
                Ok(Some(value))
            }
            None => {
                self.entries.remove(&key);
                Ok(None)
            }
        }
    }

    /// Drop `key`, returning its value if it was fresh.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.is_fresh(&entry).then_some(entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_write = None;
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    /// Fresh values in first-insertion order.
    pub fn fresh_values(&self) -> Vec<&V> {
        let mut fresh: Vec<&Entry<V>> = self
            .entries
            .values()
            .filter(|entry| self.is_fresh(entry))
            .collect();
        fresh.sort_by_key(|entry| entry.seq);
        fresh.into_iter().map(|entry| &entry.value).collect()
    }

    /// Number of fresh entries.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| self.is_fresh(e)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When anything was last written, if the cache holds any writes.
    pub fn last_write(&self) -> Option<Instant> {
        self.last_write
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }
}
