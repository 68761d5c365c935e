// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem path ↔ store key name mapping.

/// Translates between slash-delimited filesystem paths and store key names.
///
/// The reserved value-file name is per-mount configuration; a path whose
/// final segment carries it resolves to its parent key, so operations on the
/// virtual file act on the parent key's value.
#[derive(Clone, Debug)]
pub struct PathTranslator {
    value_file_name: String,
}

impl PathTranslator {
    pub fn new(value_file_name: impl Into<String>) -> Self {
        Self {
            value_file_name: value_file_name.into(),
        }
    }

    pub fn value_file_name(&self) -> &str {
        &self.value_file_name
    }

    /// Map a filesystem path to a store key name. Total and deterministic:
    /// leading/trailing separators are stripped, and the virtual value file
    /// resolves to its parent. The root maps to the empty name.
    pub fn to_store_key(&self, path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed == self.value_file_name {
            return String::new();
        }
        match trimmed.rsplit_once('/') {
            Some((parent, last)) if last == self.value_file_name => parent.to_string(),
            _ => trimmed.to_string(),
        }
    }

    /// True when the path's final segment is the reserved value-file name.
    pub fn is_virtual_value_file(&self, path: &str) -> bool {
        let trimmed = path.trim_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        last == self.value_file_name
    }
}

/// A key name at the reserved top level: the root itself or one of its
/// immediate children. Nothing may be created or removed there.
pub fn is_reserved_level(key: &str) -> bool {
    !key.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> PathTranslator {
        PathTranslator::new("@value")
    }

    #[test]
    fn strips_separators() {
        let t = translator();
        assert_eq!(t.to_store_key("/user/app/name"), "user/app/name");
        assert_eq!(t.to_store_key("/user/app/"), "user/app");
        assert_eq!(t.to_store_key("user/app"), "user/app");
        assert_eq!(t.to_store_key("/"), "");
    }

    #[test]
    fn virtual_value_file_resolves_to_parent() {
        let t = translator();
        assert_eq!(t.to_store_key("/user/app/@value"), "user/app");
        assert_eq!(t.to_store_key("/@value"), "");
        assert!(t.is_virtual_value_file("/user/app/@value"));
        assert!(t.is_virtual_value_file("@value"));
        assert!(!t.is_virtual_value_file("/user/app/@values"));
        assert!(!t.is_virtual_value_file("/user/app"));
    }

    #[test]
    fn sentinel_only_matches_final_segment() {
        let t = translator();
        assert!(!t.is_virtual_value_file("/user/@value/name"));
        assert_eq!(t.to_store_key("/user/@value/name"), "user/@value/name");
    }

    #[test]
    fn reserved_level() {
        assert!(is_reserved_level(""));
        assert!(is_reserved_level("user"));
        assert!(is_reserved_level("newroot"));
        assert!(!is_reserved_level("user/app"));
    }
}
