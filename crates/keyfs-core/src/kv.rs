// SPDX-License-Identifier: AGPL-3.0-only

//! Whole-key value operations against the store.
//!
//! The store only writes whole keys, so every mutation here is a compound
//! fetch–mutate–commit held under the key's lock. A rejected commit leaves
//! the previously committed value untouched; callers must not assume any
//! bytes were persisted on failure.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::NAMESPACE_ROOTS;
use crate::error::{FsError, FsResult};
use crate::lock::{acquire, LockTable};
use crate::path::{is_reserved_level, PathTranslator};
use crate::store::{in_scope, KeyStore};
use crate::types::{Key, KeySet, KeyValue};

pub struct KeyValueAdapter {
    store: Arc<dyn KeyStore>,
    translator: PathTranslator,
    locks: Arc<LockTable>,
}

impl KeyValueAdapter {
    pub fn new(
        store: Arc<dyn KeyStore>,
        translator: PathTranslator,
        locks: Arc<LockTable>,
    ) -> Self {
        Self {
            store,
            translator,
            locks,
        }
    }

    /// Serialized value of the key at `path`. Text values encode as UTF-8,
    /// binary values pass through unchanged, a valueless key reads empty.
    pub fn read_value(&self, path: &str) -> FsResult<Vec<u8>> {
        let key = self.translator.to_store_key(path);
        let keys = self.store.fetch(&key)?;
        let entry = keys.get(&key).ok_or(FsError::NotFound)?;
        Ok(entry.value_bytes().to_vec())
    }

    /// Overlay `data` onto the existing value at `offset` and commit the
    /// whole key. Writing to a nonexistent key fails NotFound, mirroring
    /// read semantics. Returns the number of bytes accepted.
    pub fn write_value(&self, path: &str, data: &[u8], offset: usize) -> FsResult<usize> {
        let key = self.translator.to_store_key(path);
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let mut keys = self.store.fetch(&key)?;
        let entry = keys.get_mut(&key).ok_or(FsError::NotFound)?;
        let new_value = overlay(entry.value_bytes(), data, offset);
        entry.value = Some(KeyValue::from_bytes(new_value));
        self.commit(&key, keys)?;
        debug!(key, len = data.len(), offset, "value written");
        Ok(data.len())
    }

    /// Resize the value to exactly `length` bytes: right-truncate when
    /// shrinking, zero-pad when growing.
    pub fn truncate(&self, path: &str, length: usize) -> FsResult<()> {
        let key = self.translator.to_store_key(path);
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let mut keys = self.store.fetch(&key)?;
        let entry = keys.get_mut(&key).ok_or(FsError::NotFound)?;
        let mut value = entry.value_bytes().to_vec();
        value.resize(length, 0);
        entry.value = Some(KeyValue::from_bytes(value));
        self.commit(&key, keys)
    }

    /// Create the key if absent, leaving an existing key untouched.
    pub fn create_if_absent(&self, path: &str) -> FsResult<()> {
        let key = self.translator.to_store_key(path);
        if is_reserved_level(&key) {
            return Err(FsError::WriteRejected(format!(
                "'{key}' is at the reserved top level"
            )));
        }
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let mut keys = self.store.fetch(&key)?;
        if keys.contains_key(&key) {
            return Ok(());
        }
        keys.insert(key.clone(), Key::new(key.clone()));
        self.commit(&key, keys)
    }

    /// Remove exactly the key at `path`, leaving descendant keys in place.
    /// On a dual-role key this drops the key's own value; the path keeps
    /// presenting as a directory through its surviving children.
    pub fn delete_key(&self, path: &str) -> FsResult<()> {
        let key = self.translator.to_store_key(path);
        if is_reserved_level(&key) {
            return Err(FsError::WriteRejected(format!(
                "'{key}' is at the reserved top level"
            )));
        }
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let mut keys = self.store.fetch(&key)?;
        if keys.remove(&key).is_none() {
            return Err(FsError::NotFound);
        }
        self.commit(&key, keys)
    }

    /// Remove the key and every key below it. This cascade is the explicit
    /// contract of this entry point, distinct from [`delete_key`].
    ///
    /// [`delete_key`]: KeyValueAdapter::delete_key
    pub fn delete_recursive(&self, path: &str) -> FsResult<()> {
        let key = self.translator.to_store_key(path);
        if is_reserved_level(&key) {
            return Err(FsError::WriteRejected(format!(
                "'{key}' is at the reserved top level"
            )));
        }
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let keys = self.store.fetch(&key)?;
        if keys.is_empty() {
            return Err(FsError::NotFound);
        }
        debug!(key, removed = keys.len(), "recursive delete");
        self.commit(&key, KeySet::new())
    }

    /// Rename a key and all descendants, preserving relative substructure.
    /// Existing content of the destination scope is replaced. The copy is
    /// committed before the source is cleared, so a rejected commit leaves
    /// the source intact.
    pub fn move_tree(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let old_key = self.translator.to_store_key(old_path);
        let new_key = self.translator.to_store_key(new_path);
        if old_key == new_key {
            return Ok(());
        }
        if is_reserved_level(&old_key) || is_reserved_level(&new_key) {
            return Err(FsError::WriteRejected(
                "cannot rename at the reserved top level".to_string(),
            ));
        }
        let new_root = new_key.split('/').next().unwrap_or_default();
        if !NAMESPACE_ROOTS.contains(&new_root) {
            return Err(FsError::WriteRejected(format!(
                "destination scope '{new_key}' is not under a namespace root"
            )));
        }
        if in_scope(&old_key, &new_key) {
            return Err(FsError::WriteRejected(format!(
                "destination '{new_key}' lies inside source '{old_key}'"
            )));
        }

        let (first, second) = self.locks.pair_locks(&old_key, &new_key);
        let _guard_a = acquire(&first);
        let _guard_b = acquire(&second);

        let keys = self.store.fetch(&old_key)?;
        if keys.is_empty() {
            return Err(FsError::NotFound);
        }

        let mut renamed = KeySet::new();
        for (name, mut entry) in keys {
            let new_name = format!("{new_key}{}", &name[old_key.len()..]);
            entry.name = new_name.clone();
            renamed.insert(new_name, entry);
        }

        self.commit(&new_key, renamed)?;
        self.commit(&old_key, KeySet::new())
    }

    fn commit(&self, scope: &str, keys: KeySet) -> FsResult<()> {
        self.store.commit(scope, keys).map_err(|err| {
            warn!(scope, %err, "store rejected commit");
            FsError::from(err)
        })
    }
}

/// Replace the window of `old` starting at `offset` with `data`. Writes past
/// the current length extend the value; a gap between the end of the value
/// and `offset` is not zero-filled, the overlay simply concatenates.
fn overlay(old: &[u8], data: &[u8], offset: usize) -> Vec<u8> {
    let head = &old[..offset.min(old.len())];
    let tail_start = offset.saturating_add(data.len()).min(old.len());
    let mut value = Vec::with_capacity(head.len() + data.len() + old.len() - tail_start);
    value.extend_from_slice(head);
    value.extend_from_slice(data);
    value.extend_from_slice(&old[tail_start..]);
    value
}
