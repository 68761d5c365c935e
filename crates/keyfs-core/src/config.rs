// SPDX-License-Identifier: AGPL-3.0-only

//! Mount configuration.

use serde::{Deserialize, Serialize};

/// The two reserved namespace roots. Always present, always directories.
pub const NAMESPACE_ROOTS: [&str; 2] = ["user", "system"];

/// Configuration for one mount session.
///
/// The sentinel and marker names are deliberately constructor state rather
/// than module globals; they are fixed for the lifetime of the mount.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Reserved child filename exposing a dual-role key's own value.
    ///
    /// If a real key carries this name the reserved meaning wins and the
    /// real key becomes unreachable by that name. Known limitation.
    pub value_file_name: String,
    /// Metadata flag that makes an otherwise childless, file-like key
    /// present as an empty directory.
    pub dir_marker: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            value_file_name: "@value".to_string(),
            dir_marker: "fuse-directory".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = FsConfig::default();
        assert_eq!(config.value_file_name, "@value");
        assert_eq!(config.dir_marker, "fuse-directory");
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config: FsConfig = serde_json::from_str(r#"{"value_file_name": "@v"}"#).unwrap();
        assert_eq!(config.value_file_name, "@v");
        assert_eq!(config.dir_marker, "fuse-directory");
    }
}
