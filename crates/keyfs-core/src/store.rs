// SPDX-License-Identifier: AGPL-3.0-only

//! Store collaborator boundary.
//!
//! The key database engine itself is external to this crate; KeyFS talks to
//! it through [`KeyStore`] only. One `fetch`/`commit` pair corresponds to one
//! short-lived store session: fetch a scope, mutate the working set in
//! memory, commit the whole scope back. Nothing is cached across sessions.

use crate::types::KeySet;

/// Errors surfaced by the store engine.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The store refused the commit (validation failure, read-only key, ...).
    /// Whole-scope commits mean none of the session's changes persisted.
    #[error("commit rejected: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Session-oriented access to the key database.
///
/// `scope` is a key name; a fetch returns every key whose name equals the
/// scope or has it as a strict slash-prefix. A commit atomically replaces
/// that scope with the given set: keys present in the set are written, keys
/// absent from the set are removed.
pub trait KeyStore: Send + Sync {
    fn fetch(&self, scope: &str) -> StoreResult<KeySet>;
    fn commit(&self, scope: &str, keys: KeySet) -> StoreResult<()>;
}

/// True when `name` lies inside `scope`: equal to it, or strictly below it.
pub fn in_scope(scope: &str, name: &str) -> bool {
    name == scope || (name.starts_with(scope) && name.as_bytes().get(scope.len()) == Some(&b'/'))
}
