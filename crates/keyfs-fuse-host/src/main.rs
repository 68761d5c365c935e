// SPDX-License-Identifier: AGPL-3.0-only

//! KeyFS FUSE Host — mounts a hierarchical key/value store as a filesystem.
//!
//! This binary exposes the `user` and `system` configuration namespaces as a
//! POSIX tree via libfuse (Linux).

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::KeyFsFuse;
use anyhow::Result;
use clap::Parser;
use keyfs_core::{FsConfig, KeyFs, MemoryKeyStore};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
#[cfg(not(all(feature = "fuse", target_os = "linux")))]
use tracing::warn;

#[derive(Parser)]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed file: a JSON object of key name -> text value
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,
}

fn load_config(config_path: Option<PathBuf>) -> Result<FsConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let config: FsConfig = serde_json::from_str(&content)?;
            Ok(config)
        }
        None => Ok(FsConfig::default()),
    }
}

fn load_store(seed_path: Option<PathBuf>) -> Result<MemoryKeyStore> {
    match seed_path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let seed: BTreeMap<String, String> = serde_json::from_str(&content)?;
            Ok(MemoryKeyStore::with_text_keys(
                seed.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            ))
        }
        None => Ok(MemoryKeyStore::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting KeyFS FUSE Host");
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config)?;
    info!("Configuration loaded: {:?}", config);

    let store = load_store(args.seed)?;
    let core = KeyFs::new(Arc::new(store), config);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let filesystem = KeyFsFuse::new(core);

        let mut mount_options = vec![
            fuser::MountOption::FSName("keyfs".to_string()),
            fuser::MountOption::Subtype("keyfs".to_string()),
        ];

        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }

        if args.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }

        if args.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        info!("Mounting filesystem...");
        fuser::mount2(filesystem, &args.mount_point, &mount_options)?;
        info!("KeyFS FUSE host unmounted");
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!(
            "KeyFS core initialized successfully; roots: {:?}",
            core.list("/")?
        );
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_loading_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.value_file_name, "@value");
        assert_eq!(config.dir_marker, "fuse-directory");
    }

    #[test]
    fn test_config_loading_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_json = r#"{
            "value_file_name": "@data",
            "dir_marker": "directory"
        }"#;
        temp_file.write_all(config_json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(Some(temp_file.path().to_path_buf())).unwrap();

        assert_eq!(config.value_file_name, "@data");
        assert_eq!(config.dir_marker, "directory");
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{ "value_file_name": "@v" }"#)
            .unwrap();
        temp_file.flush().unwrap();

        let config = load_config(Some(temp_file.path().to_path_buf())).unwrap();

        assert_eq!(config.value_file_name, "@v");
        assert_eq!(config.dir_marker, "fuse-directory");
    }

    #[test]
    fn test_seed_loading() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{ "user/app/name": "prod", "system/host": "web1" }"#)
            .unwrap();
        temp_file.flush().unwrap();

        let store = load_store(Some(temp_file.path().to_path_buf())).unwrap();
        let names = store.key_names();
        assert_eq!(names, vec!["system/host", "user/app/name"]);
    }

    #[test]
    fn test_empty_store_without_seed() {
        let store = load_store(None).unwrap();
        assert!(store.key_names().is_empty());
    }
}
