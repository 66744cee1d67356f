//! State shared by every node of one mounted filesystem.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dssfs_api::{ApiError, RecipeSource};
use parking_lot::Mutex;

use crate::inode::{IdAllocator, NodeTable};
use crate::options::VfsOptions;

/// Shared context handed to every node.
///
/// Created once per mount; owns the identifier allocators, the inode table
/// and the lock that keeps payload fetches one at a time.
pub(crate) struct VfsContext {
    /// Remote projects and recipes.
    pub(crate) source: Arc<dyn RecipeSource>,
    /// Inode and handle allocators.
    pub(crate) ids: IdAllocator,
    /// Inode → node index.
    pub(crate) table: NodeTable,
    /// Serializes payload fetches across all files.
    load_lock: Mutex<()>,
    pub(crate) options: VfsOptions,
    /// Owner reported for every node.
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    /// Timestamp reported for the root directory.
    pub(crate) mounted_at: SystemTime,
}

impl VfsContext {
    pub(crate) fn new(source: Arc<dyn RecipeSource>, options: VfsOptions) -> Self {
        Self {
            source,
            ids: IdAllocator::new(),
            table: NodeTable::new(),
            load_lock: Mutex::new(()),
            options,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            mounted_at: SystemTime::now(),
        }
    }

    /// Whether a listing refreshed at `refreshed_at` is past the staleness window.
    pub(crate) fn is_stale(&self, refreshed_at: Option<Instant>) -> bool {
        match refreshed_at {
            Some(at) => at.elapsed() >= self.options.cache_ttl,
            None => true,
        }
    }

    /// Fetch a recipe payload while holding the filesystem-wide load lock.
    pub(crate) fn fetch_payload(
        &self,
        project_key: &str,
        recipe_name: &str,
    ) -> Result<String, ApiError> {
        let _guard = self.load_lock.lock();
        self.source.fetch_payload(project_key, recipe_name)
    }
}
