// SPDX-License-Identifier: AGPL-3.0-only

//! Per-key mutual exclusion.
//!
//! Store commits are whole-scope, so a compound fetch–mutate–commit racing
//! another on the same key would silently drop the losing update. Every
//! compound operation takes the key's lock for its full duration instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `key`. Callers hold the returned lock across the
    /// whole fetch–mutate–commit sequence.
    pub fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }
        // An entry referenced only by the table itself has no holder left;
        // drop such entries before growing the table, so it stays bounded by
        // the number of keys under concurrent mutation rather than every key
        // name ever touched.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    /// Locks for a pair of keys, acquired in name order so that concurrent
    /// renames cannot deadlock. The guards borrow from the returned arcs.
    pub fn pair_locks(&self, a: &str, b: &str) -> (Arc<Mutex<()>>, Arc<Mutex<()>>) {
        if a <= b {
            (self.key_lock(a), self.key_lock(b))
        } else {
            let (second, first) = (self.key_lock(a), self.key_lock(b));
            (first, second)
        }
    }
}

/// Convenience for locking that tolerates a poisoned mutex: the protected
/// state lives in the store, not behind the lock, so poisoning is harmless.
pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
