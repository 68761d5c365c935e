// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory store backend.
//!
//! A real implementation of [`KeyStore`] over a flat name-ordered map.
//! Backs self-contained mounts and every test in this crate. Read-only
//! prefixes can be declared to exercise the commit-rejection path the way a
//! validating store would.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::store::{in_scope, KeyStore, StoreError, StoreResult};
use crate::types::{Key, KeySet, KeyValue};

pub struct MemoryKeyStore {
    keys: RwLock<BTreeMap<String, Key>>,
    /// Commits touching any key under one of these prefixes are rejected.
    read_only_prefixes: Vec<String>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(BTreeMap::new()),
            read_only_prefixes: Vec::new(),
        }
    }

    /// Seed the store with (name, text value) pairs.
    pub fn with_text_keys<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut keys = store.keys.write().unwrap();
            for (name, value) in entries {
                let name = name.into();
                keys.insert(
                    name.clone(),
                    Key::with_value(name, KeyValue::Text(value.into())),
                );
            }
        }
        store
    }

    /// Declare a prefix whose keys reject all commits.
    pub fn set_read_only(&mut self, prefix: impl Into<String>) {
        self.read_only_prefixes.push(prefix.into());
    }

    fn is_read_only(&self, name: &str) -> bool {
        self.read_only_prefixes.iter().any(|p| in_scope(p, name))
    }

    /// Snapshot of every key name, for assertions in tests.
    pub fn key_names(&self) -> Vec<String> {
        self.keys.read().unwrap().keys().cloned().collect()
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn fetch(&self, scope: &str) -> StoreResult<KeySet> {
        let keys = self.keys.read().unwrap();
        // Names sharing the scope prefix are contiguous; in-scope names are a
        // subset of them (siblings like `<scope>-x` sort in between).
        Ok(keys
            .range(scope.to_string()..)
            .take_while(|(name, _)| name.starts_with(scope))
            .filter(|(name, _)| in_scope(scope, name))
            .map(|(name, key)| (name.clone(), key.clone()))
            .collect())
    }

    fn commit(&self, scope: &str, new_keys: KeySet) -> StoreResult<()> {
        let mut keys = self.keys.write().unwrap();

        let existing: Vec<String> = keys
            .range(scope.to_string()..)
            .take_while(|(name, _)| name.starts_with(scope))
            .filter(|(name, _)| in_scope(scope, name))
            .map(|(name, _)| name.clone())
            .collect();

        // Reject before touching anything: a refused commit persists nothing.
        for name in existing.iter().chain(new_keys.keys()) {
            if self.is_read_only(name) {
                return Err(StoreError::Rejected(format!("key '{name}' is read-only")));
            }
        }
        for name in new_keys.keys() {
            if !in_scope(scope, name) {
                return Err(StoreError::Rejected(format!(
                    "key '{name}' outside commit scope '{scope}'"
                )));
            }
        }

        for name in existing {
            keys.remove(&name);
        }
        for (name, key) in new_keys {
            keys.insert(name, key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_scope_only() {
        let store = MemoryKeyStore::with_text_keys([
            ("user/app-x", "sibling sorting before the slash"),
            ("user/app/name", "prod"),
            ("user/app/sub/x", "5"),
            ("user/application", "other"),
        ]);

        let set = store.fetch("user/app").unwrap();
        let names: Vec<&str> = set.keys().map(String::as_str).collect();
        assert_eq!(names, ["user/app/name", "user/app/sub/x"]);
    }

    #[test]
    fn commit_replaces_scope() {
        let store = MemoryKeyStore::with_text_keys([
            ("user/app/name", "prod"),
            ("user/app/sub/x", "5"),
            ("user/other", "keep"),
        ]);

        let mut set = store.fetch("user/app").unwrap();
        set.remove("user/app/sub/x");
        store.commit("user/app", set).unwrap();

        assert_eq!(store.key_names(), ["user/app/name", "user/other"]);
    }

    #[test]
    fn commit_to_read_only_prefix_rejected() {
        let mut store = MemoryKeyStore::with_text_keys([("system/locked/a", "1")]);
        store.set_read_only("system/locked");

        let set = store.fetch("system/locked/a").unwrap();
        let err = store.commit("system/locked/a", set).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        // Nothing changed.
        assert_eq!(store.key_names(), ["system/locked/a"]);
    }

    #[test]
    fn commit_outside_scope_rejected() {
        let store = MemoryKeyStore::new();
        let mut set = KeySet::new();
        set.insert("user/b".to_string(), Key::new("user/b"));
        let err = store.commit("user/a", set).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
