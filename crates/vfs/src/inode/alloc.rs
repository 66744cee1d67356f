//! Inode and handle number allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{HandleId, INodeId, CLOSED_HANDLE, ROOT_INODE};

/// Monotonic allocators for inode numbers and file handles.
///
/// One instance lives in each mounted filesystem's shared context. Numbers
/// are never reused for the allocator's lifetime.
#[derive(Debug)]
pub struct IdAllocator {
    /// Next inode ID to allocate.
    next_inode: AtomicU64,
    /// Next file handle to allocate.
    next_handle: AtomicU64,
}

impl IdAllocator {
    /// Create allocators starting just past the reserved values.
    pub fn new() -> Self {
        Self {
            next_inode: AtomicU64::new(ROOT_INODE + 1),
            next_handle: AtomicU64::new(CLOSED_HANDLE + 1),
        }
    }

    /// Allocate a new inode ID.
    pub fn next_inode(&self) -> INodeId {
        self.next_inode.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate a new handle ID.
    pub fn next_handle(&self) -> HandleId {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
