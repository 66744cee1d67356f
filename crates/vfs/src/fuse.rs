//! FUSE adapter over [`RecipeFs`].
//!
//! fuser dispatches requests one at a time, so every request is moved onto
//! the tokio blocking pool and replied to from there. Remote calls of one
//! request never hold up another.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::VfsError;
use crate::fs::RecipeFs;
use crate::inode::{DirEntry, INodeId, NodeAttr, NodeKind};

/// Directory listings captured at `opendir`, served by `readdir`.
type DirHandles = Arc<Mutex<HashMap<u64, Arc<Vec<(INodeId, FileType, String)>>>>>;

/// FUSE filesystem exposing DSS projects and recipes.
pub struct DssVfs {
    fs: Arc<RecipeFs>,
    runtime: Handle,
    dir_handles: DirHandles,
    next_dir_handle: AtomicU64,
}

impl DssVfs {
    /// Wrap a filesystem for mounting.
    ///
    /// Must be called from within a tokio runtime; requests run on its
    /// blocking pool.
    pub fn new(fs: Arc<RecipeFs>) -> Result<Self, VfsError> {
        let runtime: Handle = Handle::try_current()
            .map_err(|e| VfsError::MountFailed(format!("No tokio runtime: {}", e)))?;
        Ok(Self {
            fs,
            runtime,
            dir_handles: Arc::new(Mutex::new(HashMap::new())),
            next_dir_handle: AtomicU64::new(1),
        })
    }

    pub fn fs(&self) -> &Arc<RecipeFs> {
        &self.fs
    }

    fn ttl(&self) -> Duration {
        self.fs.options().attr_ttl
    }

    fn mount_options(&self) -> Vec<MountOption> {
        let mut options: Vec<MountOption> = vec![
            MountOption::FSName(self.fs.options().fs_name.clone()),
            MountOption::Subtype("dssfs".to_string()),
            MountOption::AutoUnmount,
            MountOption::NoExec,
        ];
        if !self.fs.options().allow_writes {
            options.push(MountOption::RO);
        }
        options
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

/// Convert node attributes to FUSE file attributes.
fn to_file_attr(attr: &NodeAttr) -> FileAttr {
    let kind: FileType = file_type(attr.kind);
    FileAttr {
        ino: attr.inode,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.mtime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.crtime,
        kind,
        perm: attr.perm,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Full listing of `ino` including `.` and `..`.
fn snapshot_dir(
    fs: &RecipeFs,
    ino: INodeId,
) -> Result<Vec<(INodeId, FileType, String)>, VfsError> {
    let parent: INodeId = fs.node(ino)?.parent();
    let children: Vec<DirEntry> = fs.list_entries(ino)?;

    let mut entries: Vec<(INodeId, FileType, String)> = Vec::with_capacity(children.len() + 2);
    entries.push((ino, FileType::Directory, ".".to_string()));
    entries.push((parent, FileType::Directory, "..".to_string()));
    entries.extend(
        children
            .into_iter()
            .map(|entry| (entry.inode, file_type(entry.kind), entry.name)),
    );
    Ok(entries)
}

impl Filesystem for DssVfs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let fs: Arc<RecipeFs> = self.fs.clone();
        let ttl: Duration = self.ttl();
        self.runtime.spawn_blocking(move || {
            match fs.lookup(parent, &name).and_then(|node| node.attributes()) {
                Ok(attr) => reply.entry(&ttl, &to_file_attr(&attr), 0),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let fs: Arc<RecipeFs> = self.fs.clone();
        let ttl: Duration = self.ttl();
        self.runtime.spawn_blocking(move || match fs.attributes(ino) {
            Ok(attr) => reply.attr(&ttl, &to_file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        });
    }

    /// Attribute changes are not stored remotely; report the current ones.
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if size.is_some() && !self.fs.options().allow_writes {
            reply.error(libc::EROFS);
            return;
        }
        self.getattr(req, ino, None, reply);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let wants_write: bool = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if wants_write && !self.fs.options().allow_writes {
            reply.error(libc::EROFS);
            return;
        }
        let fs: Arc<RecipeFs> = self.fs.clone();
        // Sizes of closed files can lag the payload, so reads bypass the page cache.
        self.runtime.spawn_blocking(move || match fs.open(ino) {
            Ok(fh) => reply.opened(fh, FOPEN_DIRECT_IO),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let fs: Arc<RecipeFs> = self.fs.clone();
        self.runtime.spawn_blocking(move || match fs.read(ino, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let data: Vec<u8> = data.to_vec();
        let fs: Arc<RecipeFs> = self.fs.clone();
        self.runtime.spawn_blocking(move || match fs.write(ino, fh, offset, &data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let fs: Arc<RecipeFs> = self.fs.clone();
        self.runtime.spawn_blocking(move || match fs.flush(ino, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        let fs: Arc<RecipeFs> = self.fs.clone();
        self.runtime.spawn_blocking(move || match fs.close(ino, fh, flush) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!("Release of handle {} on inode {} failed: {}", fh, ino, e);
                reply.error(e.errno())
            }
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let fs: Arc<RecipeFs> = self.fs.clone();
        let handles: DirHandles = self.dir_handles.clone();
        let fh: u64 = self.next_dir_handle.fetch_add(1, Ordering::SeqCst);
        self.runtime.spawn_blocking(move || match snapshot_dir(&fs, ino) {
            Ok(entries) => {
                handles.lock().insert(fh, Arc::new(entries));
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Ok(offset) = usize::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let fs: Arc<RecipeFs> = self.fs.clone();
        let handles: DirHandles = self.dir_handles.clone();
        self.runtime.spawn_blocking(move || {
            let cached: Option<Arc<Vec<(INodeId, FileType, String)>>> =
                handles.lock().get(&fh).cloned();
            let entries: Arc<Vec<(INodeId, FileType, String)>> = match cached {
                Some(entries) => entries,
                None => {
                    debug!("No listing for handle {}; listing inode {}", fh, ino);
                    match snapshot_dir(&fs, ino) {
                        Ok(entries) => Arc::new(entries),
                        Err(e) => {
                            reply.error(e.errno());
                            return;
                        }
                    }
                }
            };

            for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset) {
                if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                    break;
                }
            }
            reply.ok();
        });
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.dir_handles.lock().remove(&fh);
        reply.ok();
    }
}

/// Mount the filesystem and block until it is unmounted.
///
/// # Arguments
/// * `vfs` - The filesystem to mount
/// * `mountpoint` - Existing directory to mount at
pub fn mount(vfs: DssVfs, mountpoint: &Path) -> Result<(), VfsError> {
    let options: Vec<MountOption> = vfs.mount_options();
    fuser::mount2(vfs, mountpoint, &options).map_err(|e| VfsError::MountFailed(e.to_string()))
}

/// Mount the filesystem in the background.
///
/// # Returns
/// Session handle; dropping it unmounts.
pub fn spawn_mount(vfs: DssVfs, mountpoint: &Path) -> Result<fuser::BackgroundSession, VfsError> {
    let options: Vec<MountOption> = vfs.mount_options();
    fuser::spawn_mount2(vfs, mountpoint, &options)
        .map_err(|e| VfsError::MountFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::FILE_PERMS;
    use crate::options::VfsOptions;
    use dssfs_api::MemoryRecipeSource;

    #[test]
    fn test_to_file_attr() {
        let now: SystemTime = SystemTime::now();
        let attr: NodeAttr = NodeAttr {
            inode: 7,
            kind: NodeKind::File,
            perm: FILE_PERMS,
            uid: 1000,
            gid: 1000,
            crtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            mtime: now,
            size: 513,
        };

        let fa: FileAttr = to_file_attr(&attr);
        assert_eq!(fa.ino, 7);
        assert_eq!(fa.kind, FileType::RegularFile);
        assert_eq!(fa.blocks, 2);
        assert_eq!(fa.nlink, 1);
        assert_eq!(fa.mtime, now);
        assert_eq!(fa.perm, FILE_PERMS);
    }

    #[test]
    fn test_new_requires_runtime() {
        let fs: Arc<RecipeFs> = Arc::new(RecipeFs::new(
            Arc::new(MemoryRecipeSource::new()),
            VfsOptions::default(),
        ));
        assert!(matches!(DssVfs::new(fs), Err(VfsError::MountFailed(_))));
    }

    #[test]
    fn test_read_only_mount_options() {
        let runtime: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let fs: Arc<RecipeFs> = Arc::new(RecipeFs::new(
            Arc::new(MemoryRecipeSource::new()),
            VfsOptions::default(),
        ));
        let vfs: DssVfs = DssVfs::new(fs).unwrap();
        let options: Vec<MountOption> = vfs.mount_options();
        assert!(options.contains(&MountOption::RO));
        assert!(options.contains(&MountOption::FSName("dss".to_string())));
    }
}
