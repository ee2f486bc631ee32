use crate::chain::types::{Tick, Token};
use portable_atomic::{AtomicU64, Ordering};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Last-value store of ticks keyed by instrument token.
///
/// Producers `publish` concurrently, the consumer calls `drain_all`. One
/// instance is built by the composition root and shared behind an `Arc`;
/// nothing here is global. Last write wins, no ordering is kept.
pub struct TickRegistry {
    ticks: Mutex<HashMap<Token, Tick>>,
    published: AtomicU64,
}

impl TickRegistry {
    pub fn new() -> Self {
        Self {
            ticks: Mutex::new(HashMap::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Overwrite the held tick for `token`.
    pub fn publish(&self, token: Token, tick: Tick) {
        self.lock().insert(token, tick);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot copy of every held tick. The store is not cleared, so the
    /// consumer may see ticks it has already applied.
    pub fn drain_all(&self) -> HashMap<Token, Tick> {
        self.lock().clone()
    }

    #[cfg(test)]
    pub fn get(&self, token: &str) -> Option<Tick> {
        self.lock().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    // A producer panicking mid-insert cannot leave a half-written HashMap entry,
    // so a poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, HashMap<Token, Tick>> {
        self.ticks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TickRegistry {
    fn default() -> Self {
        Self::new()
    }
}
