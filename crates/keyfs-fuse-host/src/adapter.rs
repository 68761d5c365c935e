// SPDX-License-Identifier: AGPL-3.0-only

//! KeyFS FUSE adapter.
//!
//! Maps FUSE operations onto the KeyFS core. fuser speaks inodes while the
//! core is path-addressed, so the adapter keeps an inode ↔ path table; it is
//! pure bookkeeping, every call still re-derives its answer from the store.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, ReplyXattr, Request, TimeOrNow, FUSE_ROOT_ID,
};
use keyfs_core::{FileAttributes, FileKind, FsError, KeyFs};
use libc::{c_int, EINVAL, EIO, ENODATA, ENOENT, ENOTEMPTY, EROFS};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Every reply uses a zero TTL: the store is the only source of truth and
/// nothing may be cached across operations.
const TTL: Duration = Duration::ZERO;

pub struct KeyFsFuse {
    core: KeyFs,
    /// inode -> filesystem path
    inodes: HashMap<u64, String>,
    /// filesystem path -> inode
    paths: HashMap<String, u64>,
    next_inode: u64,
    /// Open handles are opaque and semantically unused; a per-mount counter
    /// keeps them unique and non-negative.
    next_fh: AtomicU64,
    uid: u32,
    gid: u32,
}

impl KeyFsFuse {
    pub fn new(core: KeyFs) -> Self {
        let mut inodes = HashMap::new();
        let mut paths = HashMap::new();
        inodes.insert(FUSE_ROOT_ID, "/".to_string());
        paths.insert("/".to_string(), FUSE_ROOT_ID);

        Self {
            core,
            inodes,
            paths,
            next_inode: FUSE_ROOT_ID + 1,
            next_fh: AtomicU64::new(1),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn inode_to_path(&self, ino: u64) -> Option<&str> {
        self.inodes.get(&ino).map(String::as_str)
    }

    fn get_or_alloc_inode(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.paths.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.paths.insert(path.to_string(), ino);
        self.inodes.insert(ino, path.to_string());
        ino
    }

    fn remove_path_mapping(&mut self, path: &str) {
        if let Some(ino) = self.paths.remove(path) {
            self.inodes.remove(&ino);
        }
    }

    fn forget_inode(&mut self, ino: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        if let Some(path) = self.inodes.remove(&ino) {
            self.paths.remove(&path);
        }
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolve `(parent inode, child name)` to a full path, or None when the
    /// parent is unknown or the name is not valid UTF-8 (such a name cannot
    /// denote a store key).
    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent_path = self.inode_to_path(parent)?;
        let name = name.to_str()?;
        Some(join_child(parent_path, name))
    }

    fn attr_to_fuse(&self, attrs: &FileAttributes, ino: u64) -> FileAttr {
        let kind = match attrs.kind {
            FileKind::Directory => FileType::Directory,
            FileKind::Regular => FileType::RegularFile,
        };
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(512),
            atime: attrs.timestamp,
            mtime: attrs.timestamp,
            ctime: attrs.timestamp,
            crtime: attrs.timestamp,
            kind,
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

/// Join a parent path and child name with exactly one separator.
fn join_child(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Store condition -> filesystem error code.
fn errno_for(err: &FsError) -> c_int {
    match err {
        FsError::NotFound => ENOENT,
        FsError::WriteRejected(_) => EROFS,
        FsError::NotEmpty => ENOTEMPTY,
        FsError::NoAttributeData => ENODATA,
        FsError::Store(_) => EIO,
    }
}

/// A path directly under the filesystem root names a reserved namespace
/// root; nothing may be created or removed there.
fn parent_is_root(parent: u64) -> bool {
    parent == FUSE_ROOT_ID
}

impl fuser::Filesystem for KeyFsFuse {
    fn init(
        &mut self,
        _req: &Request,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), c_int> {
        info!("KeyFS FUSE adapter initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("KeyFS FUSE adapter destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.forget_inode(ino);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.getattr(&path) {
            Ok(attrs) => {
                let ino = self.get_or_alloc_inode(&path);
                let fuse_attr = self.attr_to_fuse(&attrs, ino);
                reply.entry(&TTL, &fuse_attr, 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.getattr(&path) {
            Ok(attrs) => {
                let fuse_attr = self.attr_to_fuse(&attrs, ino);
                reply.attr(&TTL, &fuse_attr);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        // chmod/chown are accepted and ignored; there is no permission model.
        if mode.is_some() || uid.is_some() || gid.is_some() {
            debug!(path, "ignoring mode/ownership change");
        }

        if let Some(length) = size {
            if let Err(err) = self.core.truncate(&path, length as usize) {
                reply.error(errno_for(&err));
                return;
            }
        }

        match self.core.getattr(&path) {
            Ok(attrs) => {
                let fuse_attr = self.attr_to_fuse(&attrs, ino);
                reply.attr(&TTL, &fuse_attr);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.inode_to_path(ino).is_none() {
            reply.error(ENOENT);
            return;
        }
        reply.opened(self.alloc_fh(), 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.read_window(&path, offset as usize, size as usize) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.write_value(&path, data, offset as usize) {
            Ok(written) => reply.written(written as u32),
            Err(err) => {
                warn!(path, %err, "write failed");
                reply.error(errno_for(&err));
            }
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Every write already committed; nothing is buffered.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let listing = match self.core.list(&path) {
            Ok(listing) => listing,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for dir in &listing.dirs {
            let child = join_child(&path, dir);
            let child_ino = self.get_or_alloc_inode(&child);
            entries.push((child_ino, FileType::Directory, dir.clone()));
        }
        for file in &listing.files {
            let child = join_child(&path, file);
            let child_ino = self.get_or_alloc_inode(&child);
            entries.push((child_ino, FileType::RegularFile, file.clone()));
        }

        for (i, (entry_ino, kind, name)) in
            entries.into_iter().enumerate().skip(offset as usize)
        {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        // The two root names are reserved; the top level is read-only.
        if parent_is_root(parent) {
            reply.error(EROFS);
            return;
        }
        let path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        if let Err(err) = self.core.create_file(&path) {
            reply.error(errno_for(&err));
            return;
        }

        match self.core.getattr(&path) {
            Ok(attrs) => {
                let ino = self.get_or_alloc_inode(&path);
                let fuse_attr = self.attr_to_fuse(&attrs, ino);
                reply.created(&TTL, &fuse_attr, 0, self.alloc_fh(), 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        if parent_is_root(parent) {
            reply.error(EROFS);
            return;
        }
        let path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        if let Err(err) = self.core.make_dir(&path) {
            reply.error(errno_for(&err));
            return;
        }

        match self.core.getattr(&path) {
            Ok(attrs) => {
                let ino = self.get_or_alloc_inode(&path);
                let fuse_attr = self.attr_to_fuse(&attrs, ino);
                reply.entry(&TTL, &fuse_attr, 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent_is_root(parent) {
            reply.error(EROFS);
            return;
        }
        let path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.remove_file(&path) {
            Ok(()) => {
                self.remove_path_mapping(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent_is_root(parent) {
            reply.error(EROFS);
            return;
        }
        let path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.remove_dir(&path) {
            Ok(()) => {
                self.remove_path_mapping(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        if parent_is_root(parent) || parent_is_root(newparent) {
            reply.error(EROFS);
            return;
        }
        let old_path = match self.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let new_path = match self.child_path(newparent, newname) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.rename(&old_path, &new_path) {
            Ok(()) => {
                self.remove_path_mapping(&old_path);
                self.remove_path_mapping(&new_path);
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(ENODATA);
                return;
            }
        };

        match self.core.xattr_get(&path, name) {
            Ok(value) => {
                let bytes = value.into_bytes();
                if size == 0 {
                    reply.size(bytes.len() as u32);
                } else if bytes.len() <= size as usize {
                    reply.data(&bytes);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.core.xattr_list(&path) {
            Ok(names) => {
                let mut buffer = Vec::new();
                for name in &names {
                    buffer.extend_from_slice(name.as_bytes());
                    buffer.push(0); // NUL terminator
                }
                if size == 0 {
                    reply.size(buffer.len() as u32);
                } else if buffer.len() <= size as usize {
                    reply.data(&buffer);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(EINVAL);
                return;
            }
        };

        match self.core.xattr_set(&path, name, value) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.inode_to_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(ENODATA);
                return;
            }
        };

        match self.core.xattr_remove(&path, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfs_core::{FsConfig, MemoryKeyStore, StoreError};
    use std::sync::Arc;

    fn adapter() -> KeyFsFuse {
        let store = MemoryKeyStore::with_text_keys([
            ("user/app/name", "prod"),
            ("user/app/sub/x", "5"),
        ]);
        KeyFsFuse::new(KeyFs::new(Arc::new(store), FsConfig::default()))
    }

    #[test]
    fn join_child_normalizes_separator() {
        assert_eq!(join_child("/", "user"), "/user");
        assert_eq!(join_child("/user", "app"), "/user/app");
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(errno_for(&FsError::NotFound), ENOENT);
        assert_eq!(errno_for(&FsError::WriteRejected("ro".into())), EROFS);
        assert_eq!(errno_for(&FsError::NotEmpty), ENOTEMPTY);
        assert_eq!(errno_for(&FsError::NoAttributeData), ENODATA);
        assert_eq!(
            errno_for(&FsError::Store(StoreError::Rejected("x".into()))),
            EIO
        );
    }

    #[test]
    fn inode_table_round_trips() {
        let mut fuse = adapter();
        let ino = fuse.get_or_alloc_inode("/user/app/name");
        assert_eq!(fuse.get_or_alloc_inode("/user/app/name"), ino);
        assert_eq!(fuse.inode_to_path(ino), Some("/user/app/name"));
        fuse.forget_inode(ino);
        assert_eq!(fuse.inode_to_path(ino), None);
    }

    #[test]
    fn root_inode_is_never_forgotten() {
        let mut fuse = adapter();
        fuse.forget_inode(FUSE_ROOT_ID);
        assert_eq!(fuse.inode_to_path(FUSE_ROOT_ID), Some("/"));
    }

    #[test]
    fn handles_are_monotonic() {
        let fuse = adapter();
        let a = fuse.alloc_fh();
        let b = fuse.alloc_fh();
        assert!(b > a);
    }

    #[test]
    fn child_path_rejects_unknown_parent() {
        let fuse = adapter();
        assert!(fuse.child_path(9999, OsStr::new("x")).is_none());
    }
}
