// SPDX-License-Identifier: AGPL-3.0-only

//! Directory listing synthesis over the flat key namespace.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::NAMESPACE_ROOTS;
use crate::error::FsResult;
use crate::path::PathTranslator;
use crate::store::KeyStore;

/// Immediate children of a path, split into directory and file names.
/// Sets by construction: duplicate child segments collapse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: BTreeSet<String>,
    pub files: BTreeSet<String>,
}

/// Computes directory listings by scanning all keys sharing a prefix.
#[derive(Clone)]
pub struct NamespaceLister {
    store: Arc<dyn KeyStore>,
    translator: PathTranslator,
}

impl NamespaceLister {
    pub fn new(store: Arc<dyn KeyStore>, translator: PathTranslator) -> Self {
        Self { store, translator }
    }

    /// List the immediate children of `path`.
    ///
    /// The filesystem root is a hardcoded boundary case listing exactly the
    /// two namespace roots; everything else derives from one prefix scan:
    /// a remainder with a further separator contributes its first segment to
    /// `dirs`, a separator-free remainder goes to `files`, and an empty
    /// remainder (the key itself exists) appears as the reserved value-file
    /// name.
    pub fn list(&self, path: &str) -> FsResult<Listing> {
        let key = self.translator.to_store_key(path);
        if key.is_empty() {
            return Ok(Listing {
                dirs: NAMESPACE_ROOTS.iter().map(|r| r.to_string()).collect(),
                files: BTreeSet::new(),
            });
        }

        let keys = self.store.fetch(&key)?;
        let mut listing = Listing::default();
        for name in keys.keys() {
            if name == &key {
                listing
                    .files
                    .insert(self.translator.value_file_name().to_string());
                continue;
            }
            let remainder = &name[key.len() + 1..];
            match remainder.split_once('/') {
                Some((first, _)) => listing.dirs.insert(first.to_string()),
                None => listing.files.insert(remainder.to_string()),
            };
        }
        Ok(listing)
    }

    /// Whether any key exists strictly below `path`. The key's own existence
    /// (surfacing as the virtual value file) does not count as a child here;
    /// an empty directory key must stay removable.
    pub fn has_descendants(&self, path: &str) -> FsResult<bool> {
        let listing = self.list(path)?;
        Ok(!listing.dirs.is_empty()
            || listing
                .files
                .iter()
                .any(|f| f != self.translator.value_file_name()))
    }
}
