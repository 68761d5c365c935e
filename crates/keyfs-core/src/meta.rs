// SPDX-License-Identifier: AGPL-3.0-only

//! Extended attributes over a key's metadata map.
//!
//! The store has no per-entry metadata mutation, so everything except
//! `get_all` is fetch-full-map, mutate in memory, replace-full-map.
//! Metadata values are text-only; bytes that do not decode as UTF-8 are
//! coerced to the empty string rather than rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::lock::{acquire, LockTable};
use crate::path::PathTranslator;
use crate::store::KeyStore;

pub struct MetadataBridge {
    store: Arc<dyn KeyStore>,
    translator: PathTranslator,
    locks: Arc<LockTable>,
}

impl MetadataBridge {
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

    /// The key's full metadata map, or NotFound.
    pub fn get_all(&self, path: &str) -> FsResult<BTreeMap<String, String>> {
        let key = self.translator.to_store_key(path);
        let keys = self.store.fetch(&key)?;
        let entry = keys.get(&key).ok_or(FsError::NotFound)?;
        Ok(entry.meta.clone())
    }

    /// A single metadata value; a missing name is NoAttributeData.
    pub fn get(&self, path: &str, name: &str) -> FsResult<String> {
        self.get_all(path)?
            .remove(name)
            .ok_or(FsError::NoAttributeData)
    }

    /// Set one metadata entry, replacing the whole map at the store.
    pub fn set(&self, path: &str, name: &str, value: &[u8]) -> FsResult<()> {
        let text = String::from_utf8(value.to_vec()).unwrap_or_default();
        self.mutate(path, |meta| {
            meta.insert(name.to_string(), text);
            Ok(())
        })
    }

    /// Remove one metadata entry; a missing name is NoAttributeData.
    pub fn remove(&self, path: &str, name: &str) -> FsResult<()> {
        self.mutate(path, |meta| {
            meta.remove(name).map(|_| ()).ok_or(FsError::NoAttributeData)
        })
    }

    fn mutate<F>(&self, path: &str, apply: F) -> FsResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> FsResult<()>,
    {
        let key = self.translator.to_store_key(path);
        let lock = self.locks.key_lock(&key);
        let _guard = acquire(&lock);

        let mut keys = self.store.fetch(&key)?;
        let entry = keys.get_mut(&key).ok_or(FsError::NotFound)?;
        apply(&mut entry.meta)?;
        self.store.commit(&key, keys)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyStore;

    fn bridge(store: MemoryKeyStore) -> MetadataBridge {
        MetadataBridge::new(
            Arc::new(store),
            PathTranslator::new("@value"),
            Arc::new(LockTable::new()),
        )
    }

    #[test]
    fn set_get_remove_round_trip() {
        let meta = bridge(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));

        meta.set("/user/app/name", "check", b"range").unwrap();
        assert_eq!(meta.get("/user/app/name", "check").unwrap(), "range");
        assert_eq!(meta.get_all("/user/app/name").unwrap().len(), 1);

        meta.remove("/user/app/name", "check").unwrap();
        assert!(meta.get_all("/user/app/name").unwrap().is_empty());
    }

    #[test]
    fn missing_name_is_no_attribute_data() {
        let meta = bridge(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));
        assert!(matches!(
            meta.get("/user/app/name", "absent"),
            Err(FsError::NoAttributeData)
        ));
        assert!(matches!(
            meta.remove("/user/app/name", "absent"),
            Err(FsError::NoAttributeData)
        ));
    }

    #[test]
    fn missing_key_is_not_found() {
        let meta = bridge(MemoryKeyStore::new());
        assert!(matches!(
            meta.get_all("/user/nope"),
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            meta.set("/user/nope", "a", b"b"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn non_utf8_value_coerces_to_empty() {
        let meta = bridge(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));
        meta.set("/user/app/name", "raw", &[0xff, 0xfe]).unwrap();
        assert_eq!(meta.get("/user/app/name", "raw").unwrap(), "");
    }

    #[test]
    fn replace_keeps_other_entries() {
        let meta = bridge(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));
        meta.set("/user/app/name", "a", b"1").unwrap();
        meta.set("/user/app/name", "b", b"2").unwrap();
        meta.remove("/user/app/name", "a").unwrap();
        let all = meta.get_all("/user/app/name").unwrap();
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
        assert_eq!(all.len(), 1);
    }
}
