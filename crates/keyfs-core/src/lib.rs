// SPDX-License-Identifier: AGPL-3.0-only

//! KeyFS Core — a hierarchical key/value configuration store presented as a
//! filesystem tree.
//!
//! The store itself is an external collaborator reached through the
//! [`KeyStore`] trait; this crate is the translation layer: path ↔ key-name
//! mapping, directory-listing synthesis over the flat key namespace,
//! directory/file/dual-role classification, and whole-key read-modify-write
//! for values and metadata. Every operation re-derives its state from the
//! store; nothing is cached between calls.

pub mod attr;
pub mod config;
pub mod error;
pub mod kv;
pub mod lock;
pub mod memory;
pub mod meta;
pub mod namespace;
pub mod path;
pub mod store;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

pub use crate::attr::AttributeResolver;
pub use crate::config::{FsConfig, NAMESPACE_ROOTS};
pub use crate::error::{FsError, FsResult};
pub use crate::kv::KeyValueAdapter;
pub use crate::lock::LockTable;
pub use crate::memory::MemoryKeyStore;
pub use crate::meta::MetadataBridge;
pub use crate::namespace::{Listing, NamespaceLister};
pub use crate::path::PathTranslator;
pub use crate::store::{KeyStore, StoreError, StoreResult};
pub use crate::types::{FileAttributes, FileKind, Key, KeySet, KeyValue, NodeKind};

/// Facade over the translation components; the single handle a filesystem
/// host holds. Construction captures the mount start time used for every
/// synthesized timestamp.
pub struct KeyFs {
    config: FsConfig,
    lister: NamespaceLister,
    attrs: AttributeResolver,
    kv: KeyValueAdapter,
    meta: MetadataBridge,
}

impl KeyFs {
    pub fn new(store: Arc<dyn KeyStore>, config: FsConfig) -> Self {
        let translator = PathTranslator::new(config.value_file_name.clone());
        let locks = Arc::new(LockTable::new());
        let lister = NamespaceLister::new(Arc::clone(&store), translator.clone());
        let attrs = AttributeResolver::new(
            Arc::clone(&store),
            lister.clone(),
            translator.clone(),
            config.dir_marker.clone(),
            SystemTime::now(),
        );
        let kv = KeyValueAdapter::new(Arc::clone(&store), translator.clone(), Arc::clone(&locks));
        let meta = MetadataBridge::new(store, translator, locks);
        Self {
            config,
            lister,
            attrs,
            kv,
            meta,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    // Classification and attributes.

    pub fn classify(&self, path: &str) -> FsResult<NodeKind> {
        self.attrs.classify(path)
    }

    pub fn getattr(&self, path: &str) -> FsResult<FileAttributes> {
        self.attrs.getattr(path)
    }

    // Listing.

    pub fn list(&self, path: &str) -> FsResult<Listing> {
        self.lister.list(path)
    }

    // Values.

    pub fn read_value(&self, path: &str) -> FsResult<Vec<u8>> {
        self.kv.read_value(path)
    }

    /// Read at most `size` bytes starting at `offset`, clamped to the value.
    pub fn read_window(&self, path: &str, offset: usize, size: usize) -> FsResult<Vec<u8>> {
        let value = self.kv.read_value(path)?;
        let start = offset.min(value.len());
        let end = offset.saturating_add(size).min(value.len());
        Ok(value[start..end].to_vec())
    }

    pub fn write_value(&self, path: &str, data: &[u8], offset: usize) -> FsResult<usize> {
        self.kv.write_value(path, data, offset)
    }

    pub fn truncate(&self, path: &str, length: usize) -> FsResult<()> {
        self.kv.truncate(path, length)
    }

    // Tree mutation.

    pub fn create_file(&self, path: &str) -> FsResult<()> {
        self.kv.create_if_absent(path)
    }

    /// Create the key and mark it as a directory. The marker is what keeps an
    /// otherwise childless key presenting as an empty directory.
    pub fn make_dir(&self, path: &str) -> FsResult<()> {
        self.kv.create_if_absent(path)?;
        self.meta.set(path, &self.config.dir_marker, b"")
    }

    /// Remove a file entry (leaf-only; descendants of a dual-role key
    /// survive).
    pub fn remove_file(&self, path: &str) -> FsResult<()> {
        self.kv.delete_key(path)
    }

    /// Remove a directory: fails NotEmpty while any key lies below the path.
    /// A directory that exists only as a name prefix (no key of its own)
    /// removes as a no-op.
    pub fn remove_dir(&self, path: &str) -> FsResult<()> {
        if self.lister.has_descendants(path)? {
            return Err(FsError::NotEmpty);
        }
        match self.kv.delete_recursive(path) {
            Err(FsError::NotFound) => Ok(()),
            other => other,
        }
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        self.kv.move_tree(old_path, new_path)
    }

    // Metadata.

    pub fn xattr_get(&self, path: &str, name: &str) -> FsResult<String> {
        self.meta.get(path, name)
    }

    pub fn xattr_list(&self, path: &str) -> FsResult<Vec<String>> {
        Ok(self.meta.get_all(path)?.into_keys().collect())
    }

    pub fn xattr_get_all(&self, path: &str) -> FsResult<BTreeMap<String, String>> {
        self.meta.get_all(path)
    }

    pub fn xattr_set(&self, path: &str, name: &str, value: &[u8]) -> FsResult<()> {
        self.meta.set(path, name, value)
    }

    pub fn xattr_remove(&self, path: &str, name: &str) -> FsResult<()> {
        self.meta.remove(path, name)
    }
}
