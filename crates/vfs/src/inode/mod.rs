//! Inode primitives for the virtual filesystem.
//!
//! Identifier types, the shared allocators, and the inode → node table the
//! FUSE layer resolves requests through.

mod alloc;
mod table;
mod types;

pub use alloc::IdAllocator;
pub use table::NodeTable;
pub use types::{
    DirEntry, HandleId, INodeId, NodeAttr, NodeKind, CLOSED_HANDLE, DIR_PERMS, FILE_PERMS,
    ROOT_INODE,
};
