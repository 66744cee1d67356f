//! Core identifier and attribute types.

use std::time::SystemTime;

/// Unique identifier for a node.
pub type INodeId = u64;

/// Identifier of an open file session.
pub type HandleId = u64;

/// Root directory inode ID (always 1 per FUSE convention).
pub const ROOT_INODE: INodeId = 1;

/// Handle value meaning "no open session".
pub const CLOSED_HANDLE: HandleId = 0;

/// Directory permissions (r-xr-xr-x).
pub const DIR_PERMS: u16 = 0o555;

/// Recipe file permissions (rw-r--r--).
pub const FILE_PERMS: u16 = 0o644;

/// Kind of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root or project directory.
    Directory,
    /// Recipe file.
    File,
}

/// Attributes reported for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttr {
    pub inode: INodeId,
    pub kind: NodeKind,
    /// POSIX permission bits.
    pub perm: u16,
    pub uid: u32,
    pub gid: u32,
    /// Creation time of the remote resource.
    pub crtime: SystemTime,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    /// Content length in bytes (0 for directories).
    pub size: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: INodeId,
    pub name: String,
    pub kind: NodeKind,
}
