// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Short-lived cache for derived aggregates such as a profile's balance.
//!
//! There is no dependency tracking: every write that changes rows feeding a
//! cached value must call [`AggregateCache::invalidate`] for its key.

use crate::logging::TARGET;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

struct Entry<V> {
    value: V,
    inserted: Instant,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct AggregateCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

pub fn balance_key(profile_id: i64) -> String {
    format!("balance:{profile_id}")
}

impl<V: Clone> Default for AggregateCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> AggregateCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh value for `key`, evicting it if its ttl has elapsed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            Some(e) if e.inserted.elapsed() < e.ttl => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(entries);
        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(target: TARGET, event = "cache_hit", key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(target: TARGET, event = "cache_miss", key);
        }
        fresh
    }

    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.lock().insert(
            key.into(),
            Entry {
                value,
                inserted: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }
}
