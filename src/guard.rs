//! In-flight markers and view liveness.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Keys with a write in flight.
///
/// At most one write per key runs at a time. A second attempt on a pending key
/// is refused rather than queued.
#[derive(Debug)]
pub struct PendingSet<K: Eq + Hash + Clone> {
    keys: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Default for PendingSet<K> {
    fn default() -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> Clone for PendingSet<K> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<K: Eq + Hash + Clone> PendingSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` pending. Returns `None` if it already is.
    ///
    /// The key stays pending until the returned guard is dropped, including
    /// when the owning future is cancelled.
    pub fn try_begin(&self, key: K) -> Option<PendingGuard<K>> {
        self.try_begin_unless(key, |_| false)
    }

    /// Like [`try_begin`](Self::try_begin), but also refused when `blocked`
    /// holds for the keys already pending. Checked and marked under one lock.
    pub fn try_begin_unless<F>(&self, key: K, blocked: F) -> Option<PendingGuard<K>>
    where
        F: FnOnce(&HashSet<K>) -> bool,
    {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if blocked(&keys) || !keys.insert(key.clone()) {
            return None;
        }
        Some(PendingGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Clears its key from the [`PendingSet`] on drop.
#[derive(Debug)]
pub struct PendingGuard<K: Eq + Hash + Clone> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for PendingGuard<K> {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Liveness of the view that owns some local state.
///
/// Async completions check this before touching the state; once the view is
/// closed their results are discarded.
#[derive(Debug, Clone)]
pub struct ViewScope {
    alive: Arc<AtomicBool>,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the view gone. Shared by every clone.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }
}
