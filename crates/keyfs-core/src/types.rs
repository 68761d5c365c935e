// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for KeyFS

use std::collections::BTreeMap;
use std::time::SystemTime;

/// A key's scalar payload. The store keeps values either as UTF-8 text or as
/// opaque bytes; writes re-encode opportunistically (text wins when the bytes
/// decode).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyValue {
    Text(String),
    Binary(Vec<u8>),
}

impl KeyValue {
    /// Build a value from raw bytes, preferring the text representation.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => KeyValue::Text(text),
            Err(err) => KeyValue::Binary(err.into_bytes()),
        }
    }

    /// Serialized byte view (text encodes as UTF-8, binary passes through).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyValue::Text(s) => s.as_bytes(),
            KeyValue::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// A single named entry in the store: slash-delimited name, optional scalar
/// value, and a string-valued metadata map.
///
/// A key's existence is independent of keys above or below it in the name
/// hierarchy; `user/a/b` may exist without `user/a`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub value: Option<KeyValue>,
    pub meta: BTreeMap<String, String>,
}

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: KeyValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            meta: BTreeMap::new(),
        }
    }

    /// Serialized value bytes; a valueless key reads as empty.
    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_ref().map(KeyValue::as_bytes).unwrap_or(&[])
    }
}

/// Working set of keys fetched for one store session, ordered by name.
/// Built fresh per operation and discarded after commit.
pub type KeySet = BTreeMap<String, Key>;

/// Synthesized filesystem node classification. Not stored anywhere; always
/// recomputed from the key namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    /// Key with both its own value and at least one descendant. Presents as a
    /// directory; the value is reachable through the virtual value file.
    DualRole,
    File,
    Absent,
}

impl NodeKind {
    pub fn is_directory(self) -> bool {
        matches!(self, NodeKind::Directory | NodeKind::DualRole)
    }
}

/// Kind carried by synthesized attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

/// Synthesized attributes for a path. Permission bits are fixed and
/// timestamps are the mount start time; the store tracks neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub kind: FileKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub timestamp: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_from_bytes_prefers_text() {
        assert_eq!(
            KeyValue::from_bytes(b"hello".to_vec()),
            KeyValue::Text("hello".to_string())
        );
        assert_eq!(
            KeyValue::from_bytes(vec![0xff, 0xfe]),
            KeyValue::Binary(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn valueless_key_reads_empty() {
        let key = Key::new("user/a");
        assert_eq!(key.value_bytes(), b"");
    }

    #[test]
    fn value_bytes_round_trip() {
        let key = Key::with_value("user/a", KeyValue::from_bytes(b"prod".to_vec()));
        assert_eq!(key.value_bytes(), b"prod");
    }
}
