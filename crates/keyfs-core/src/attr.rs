// SPDX-License-Identifier: AGPL-3.0-only

//! Node classification and synthesized attributes.

use std::sync::Arc;
use std::time::SystemTime;

use crate::config::NAMESPACE_ROOTS;
use crate::error::{FsError, FsResult};
use crate::namespace::NamespaceLister;
use crate::path::PathTranslator;
use crate::store::KeyStore;
use crate::types::{FileAttributes, FileKind, NodeKind};

const PERM_BITS: u16 = 0o755;

/// Classifies paths and synthesizes their attributes.
///
/// Classification is recomputed from scratch on every call, from three
/// structural facts: whether a key exists at the exact name, whether any key
/// lies strictly below it, and whether the force-directory marker is set.
pub struct AttributeResolver {
    store: Arc<dyn KeyStore>,
    lister: NamespaceLister,
    translator: PathTranslator,
    dir_marker: String,
    /// Timestamp reported for every node; the store tracks no real times.
    start_time: SystemTime,
}

impl AttributeResolver {
    pub fn new(
        store: Arc<dyn KeyStore>,
        lister: NamespaceLister,
        translator: PathTranslator,
        dir_marker: impl Into<String>,
        start_time: SystemTime,
    ) -> Self {
        Self {
            store,
            lister,
            translator,
            dir_marker: dir_marker.into(),
            start_time,
        }
    }

    /// Classify a path as directory, file, dual-role or absent.
    pub fn classify(&self, path: &str) -> FsResult<NodeKind> {
        // The virtual value file always presents as a file; whether its
        // parent key actually exists is checked when attributes are read.
        if self.translator.is_virtual_value_file(path) {
            return Ok(NodeKind::File);
        }

        let key = self.translator.to_store_key(path);
        if key.is_empty() || NAMESPACE_ROOTS.contains(&key.as_str()) {
            return Ok(NodeKind::Directory);
        }

        let listing = self.lister.list(path)?;
        let key_exists = listing
            .files
            .contains(self.translator.value_file_name());
        let has_children = !listing.dirs.is_empty()
            || listing
                .files
                .iter()
                .any(|f| f != self.translator.value_file_name());

        let kind = match (has_children, key_exists) {
            (true, true) => NodeKind::DualRole,
            (true, false) => NodeKind::Directory,
            (false, true) if self.has_dir_marker(&key)? => NodeKind::Directory,
            (false, true) => NodeKind::File,
            (false, false) => NodeKind::Absent,
        };
        Ok(kind)
    }

    /// Synthesized attributes for a path, or NotFound.
    pub fn getattr(&self, path: &str) -> FsResult<FileAttributes> {
        match self.classify(path)? {
            NodeKind::Directory | NodeKind::DualRole => Ok(FileAttributes {
                kind: FileKind::Directory,
                perm: PERM_BITS,
                nlink: 2,
                size: 0,
                timestamp: self.start_time,
            }),
            NodeKind::File => {
                let size = self.key_size(path)?;
                Ok(FileAttributes {
                    kind: FileKind::Regular,
                    perm: PERM_BITS,
                    nlink: 1,
                    size,
                    timestamp: self.start_time,
                })
            }
            NodeKind::Absent => Err(FsError::NotFound),
        }
    }

    fn key_size(&self, path: &str) -> FsResult<u64> {
        let key = self.translator.to_store_key(path);
        let keys = self.store.fetch(&key)?;
        let entry = keys.get(&key).ok_or(FsError::NotFound)?;
        Ok(entry.value_bytes().len() as u64)
    }

    fn has_dir_marker(&self, key: &str) -> FsResult<bool> {
        let keys = self.store.fetch(key)?;
        Ok(keys
            .get(key)
            .map(|k| k.meta.contains_key(&self.dir_marker))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyStore;
    use crate::types::{Key, KeyValue};

    fn resolver(store: MemoryKeyStore) -> AttributeResolver {
        let store: Arc<dyn KeyStore> = Arc::new(store);
        let translator = PathTranslator::new("@value");
        let lister = NamespaceLister::new(Arc::clone(&store), translator.clone());
        AttributeResolver::new(
            store,
            lister,
            translator,
            "fuse-directory",
            SystemTime::now(),
        )
    }

    #[test]
    fn roots_are_always_directories() {
        let resolver = resolver(MemoryKeyStore::new());
        assert_eq!(resolver.classify("/").unwrap(), NodeKind::Directory);
        assert_eq!(resolver.classify("/user").unwrap(), NodeKind::Directory);
        assert_eq!(resolver.classify("/system").unwrap(), NodeKind::Directory);
    }

    #[test]
    fn leaf_key_is_a_file() {
        let resolver = resolver(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));
        assert_eq!(resolver.classify("/user/app/name").unwrap(), NodeKind::File);
        let attrs = resolver.getattr("/user/app/name").unwrap();
        assert_eq!(attrs.kind, FileKind::Regular);
        assert_eq!(attrs.size, 4);
        assert_eq!(attrs.nlink, 1);
        assert_eq!(attrs.perm, 0o755);
    }

    #[test]
    fn intermediate_path_is_a_directory() {
        let resolver = resolver(MemoryKeyStore::with_text_keys([("user/app/name", "prod")]));
        assert_eq!(resolver.classify("/user/app").unwrap(), NodeKind::Directory);
        let attrs = resolver.getattr("/user/app").unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.nlink, 2);
    }

    #[test]
    fn key_with_value_and_children_is_dual_role() {
        let resolver = resolver(MemoryKeyStore::with_text_keys([
            ("user/app", "root-value"),
            ("user/app/child", "1"),
        ]));
        assert_eq!(resolver.classify("/user/app").unwrap(), NodeKind::DualRole);
        // Presents as a directory.
        assert_eq!(
            resolver.getattr("/user/app").unwrap().kind,
            FileKind::Directory
        );
    }

    #[test]
    fn virtual_value_file_exposes_parent_size() {
        let resolver = resolver(MemoryKeyStore::with_text_keys([
            ("user/app", "root-value"),
            ("user/app/child", "1"),
        ]));
        assert_eq!(
            resolver.classify("/user/app/@value").unwrap(),
            NodeKind::File
        );
        let attrs = resolver.getattr("/user/app/@value").unwrap();
        assert_eq!(attrs.kind, FileKind::Regular);
        assert_eq!(attrs.size, "root-value".len() as u64);
    }

    #[test]
    fn virtual_value_file_without_parent_key_is_not_found() {
        let resolver = resolver(MemoryKeyStore::with_text_keys([("user/app/child", "1")]));
        assert!(matches!(
            resolver.getattr("/user/app/@value"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn force_directory_marker_overrides_file() {
        let store = MemoryKeyStore::new();
        {
            let mut key = Key::with_value("user/dir", KeyValue::Text(String::new()));
            key.meta
                .insert("fuse-directory".to_string(), String::new());
            let mut set = crate::types::KeySet::new();
            set.insert(key.name.clone(), key);
            use crate::store::KeyStore as _;
            store.commit("user/dir", set).unwrap();
        }
        let resolver = resolver(store);
        assert_eq!(resolver.classify("/user/dir").unwrap(), NodeKind::Directory);
    }

    #[test]
    fn missing_path_is_absent() {
        let resolver = resolver(MemoryKeyStore::new());
        assert_eq!(resolver.classify("/user/nope").unwrap(), NodeKind::Absent);
        assert!(matches!(
            resolver.getattr("/user/nope"),
            Err(FsError::NotFound)
        ));
    }
}
