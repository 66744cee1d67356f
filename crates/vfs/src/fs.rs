//! The recipe filesystem: inode-addressed operations over the node tree.

use std::sync::Arc;
use std::time::Instant;

use dssfs_api::RecipeSource;
use tracing::{debug, warn};

use crate::context::VfsContext;
use crate::error::VfsError;
use crate::inode::{DirEntry, HandleId, INodeId, NodeAttr};
use crate::node::{FileNode, Node, RootNode};
use crate::options::VfsOptions;

/// Counters describing the current state of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VfsStats {
    /// Visible project directories.
    pub projects: usize,
    /// Visible recipe files.
    pub files: usize,
    /// Files with an open session.
    pub open_files: usize,
    /// Nodes hidden from listings but still reachable by inode.
    pub retired: usize,
    /// Entries in the inode table, root included.
    pub inodes: usize,
    /// Seconds since the filesystem was created.
    pub uptime_secs: u64,
}

/// Filesystem over a [`RecipeSource`], addressed by inode the way the kernel
/// addresses it.
///
/// The FUSE facade is a thin adapter over this type; tests drive it directly.
pub struct RecipeFs {
    ctx: Arc<VfsContext>,
    root: Arc<RootNode>,
    start_time: Instant,
}

impl RecipeFs {
    /// Create a filesystem with an unpopulated root.
    ///
    /// # Arguments
    /// * `source` - Remote projects and recipes
    /// * `options` - Staleness window, write policy and naming
    pub fn new(source: Arc<dyn RecipeSource>, options: VfsOptions) -> Self {
        let ctx: Arc<VfsContext> = Arc::new(VfsContext::new(source, options));
        let root: Arc<RootNode> = RootNode::new(ctx.clone());
        ctx.table.insert(Node::Root(root.clone()));
        Self {
            ctx,
            root,
            start_time: Instant::now(),
        }
    }

    pub fn options(&self) -> &VfsOptions {
        &self.ctx.options
    }

    pub fn root(&self) -> &Arc<RootNode> {
        &self.root
    }

    /// Resolve an inode number to its node.
    pub fn node(&self, ino: INodeId) -> Result<Node, VfsError> {
        self.ctx.table.get(ino).ok_or(VfsError::InodeNotFound(ino))
    }

    fn file(&self, ino: INodeId) -> Result<Arc<FileNode>, VfsError> {
        let node: Node = self.node(ino)?;
        node.as_file().cloned()
    }

    /// Resolve `name` inside the directory `parent`.
    pub fn lookup(&self, parent: INodeId, name: &str) -> Result<Node, VfsError> {
        self.node(parent)?.lookup(name)
    }

    /// Resolve a slash-separated path from the root, e.g. `/Sales/compute_totals`.
    pub fn resolve_path(&self, path: &str) -> Result<Node, VfsError> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(Node::Root(self.root.clone()), |node, part| node.lookup(part))
    }

    pub fn attributes(&self, ino: INodeId) -> Result<NodeAttr, VfsError> {
        self.node(ino)?.attributes()
    }

    /// Refresh and list the directory `ino`.
    pub fn list_entries(&self, ino: INodeId) -> Result<Vec<DirEntry>, VfsError> {
        self.node(ino)?.list_entries()
    }

    pub fn open(&self, ino: INodeId) -> Result<HandleId, VfsError> {
        self.file(ino)?.open()
    }

    pub fn read(
        &self,
        ino: INodeId,
        fh: HandleId,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, VfsError> {
        self.file(ino)?.read(fh, offset, size)
    }

    pub fn write(
        &self,
        ino: INodeId,
        fh: HandleId,
        offset: u64,
        data: &[u8],
    ) -> Result<u32, VfsError> {
        self.file(ino)?.write(fh, offset, data)
    }

    pub fn flush(&self, ino: INodeId, fh: HandleId) -> Result<(), VfsError> {
        self.file(ino)?.flush(fh)
    }

    /// End a session, then drop any retired nodes it was keeping alive.
    ///
    /// # Arguments
    /// * `flush` - Save unsaved edits before closing
    pub fn release(&self, ino: INodeId, fh: HandleId, flush: bool) -> Result<(), VfsError> {
        let file: Arc<FileNode> = self.file(ino)?;
        file.release(fh, flush)?;

        if let Some(Node::Directory(dir)) = self.ctx.table.get(file.parent()) {
            if file.is_retired() {
                dir.collect_retired();
            }
            if dir.is_retired() {
                debug!("Collecting retired project {}", dir.project_key());
                self.root.collect_retired();
            }
        }
        Ok(())
    }

    /// End a session the caller will never refer to again.
    ///
    /// Like [`release`](Self::release), but if saving fails the session is
    /// closed anyway and its edits discarded. The save error is still returned.
    pub fn close(&self, ino: INodeId, fh: HandleId, flush: bool) -> Result<(), VfsError> {
        let result: Result<(), VfsError> = self.release(ino, fh, flush);
        if let Err(e @ (VfsError::RemoteUnavailable(_) | VfsError::InvalidContent(_))) = &result {
            warn!(
                "Discarding unsaved edits to inode {} after failed save on close: {}",
                ino, e
            );
            self.release(ino, fh, false)?;
        }
        result
    }

    /// Snapshot of tree counters; never contacts the remote.
    pub fn stats(&self) -> VfsStats {
        let mut stats: VfsStats = VfsStats {
            inodes: self.ctx.table.len(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            ..Default::default()
        };

        for dir in self.root.dirs() {
            if dir.is_retired() {
                stats.retired += 1;
            } else {
                stats.projects += 1;
            }
            for file in dir.files() {
                if file.is_open() {
                    stats.open_files += 1;
                }
                if file.is_retired() {
                    stats.retired += 1;
                } else if !dir.is_retired() {
                    stats.files += 1;
                }
            }
        }
        stats
    }
}

impl std::fmt::Debug for RecipeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeFs")
            .field("options", &self.ctx.options)
            .field("inodes", &self.ctx.table.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::ROOT_INODE;
    use dssfs_api::{MemoryRecipeSource, ProjectSnapshot, RecipeSnapshot};

    fn create_test_fs() -> (Arc<MemoryRecipeSource>, RecipeFs) {
        let source: Arc<MemoryRecipeSource> = Arc::new(MemoryRecipeSource::new());
        source.add_project(ProjectSnapshot::new("PROJ", "Project"));
        source.add_recipe(RecipeSnapshot::new("PROJ", "recipe1.py", "python"), "abcdef");
        let fs: RecipeFs = RecipeFs::new(source.clone(), VfsOptions::default());
        (source, fs)
    }

    #[test]
    fn test_root_registered() {
        let (_source, fs) = create_test_fs();
        let node: Node = fs.node(ROOT_INODE).unwrap();
        assert!(matches!(node, Node::Root(_)));
        assert_eq!(fs.stats().inodes, 1);
    }

    #[test]
    fn test_resolve_path() {
        let (_source, fs) = create_test_fs();
        let node: Node = fs.resolve_path("/Project/recipe1.py").unwrap();
        assert_eq!(node.name(), "recipe1.py");
        assert_eq!(node.parent(), fs.resolve_path("/Project").unwrap().inode());
        assert_eq!(fs.resolve_path("/").unwrap().inode(), ROOT_INODE);

        assert!(matches!(
            fs.resolve_path("/Project/recipe1.py/deeper"),
            Err(VfsError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.resolve_path("/NOPE"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_inode() {
        let (_source, fs) = create_test_fs();
        assert!(matches!(fs.attributes(999), Err(VfsError::InodeNotFound(999))));
        assert!(matches!(fs.open(ROOT_INODE), Err(VfsError::IsADirectory(_))));
    }

    #[test]
    fn test_close_after_failed_save() {
        let (source, _fs) = create_test_fs();
        let fs: RecipeFs = RecipeFs::new(source.clone(), VfsOptions::default().with_allow_writes(true));
        let ino: INodeId = fs.resolve_path("/Project/recipe1.py").unwrap().inode();
        let fh: HandleId = fs.open(ino).unwrap();
        fs.write(ino, fh, 0, b"x").unwrap();

        source.fail_saves(true);
        let err: VfsError = fs.close(ino, fh, true).unwrap_err();
        assert_eq!(err.errno(), libc::EIO);
        source.fail_saves(false);

        assert!(matches!(fs.read(ino, fh, 0, 10), Err(VfsError::ProtocolMisuse { .. })));
        let again: HandleId = fs.open(ino).unwrap();
        assert_eq!(fs.read(ino, again, 0, 10).unwrap(), b"abcdef");
        assert!(source.saves().is_empty());
    }

    #[test]
    fn test_close_with_stale_handle() {
        let (_source, fs) = create_test_fs();
        let ino: INodeId = fs.resolve_path("/Project/recipe1.py").unwrap().inode();
        let fh: HandleId = fs.open(ino).unwrap();

        assert!(matches!(
            fs.close(ino, fh + 1, true),
            Err(VfsError::ProtocolMisuse { .. })
        ));
        fs.close(ino, fh, true).unwrap();
        assert_eq!(fs.stats().open_files, 0);
    }

    #[test]
    fn test_stats() {
        let (_source, fs) = create_test_fs();
        let ino: INodeId = fs.resolve_path("/Project/recipe1.py").unwrap().inode();
        let fh: HandleId = fs.open(ino).unwrap();

        let stats: VfsStats = fs.stats();
        assert_eq!(stats.projects, 1);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.open_files, 1);
        assert_eq!(stats.retired, 0);
        assert_eq!(stats.inodes, 3);

        fs.release(ino, fh, true).unwrap();
        assert_eq!(fs.stats().open_files, 0);
    }
}
