//! Filesystem nodes: the root, one directory per project, one file per recipe.
//!
//! Directory nodes own their children; the shared [`NodeTable`](crate::inode::NodeTable)
//! only indexes them so the kernel's inode numbers can be resolved.

mod dir;
mod file;
mod root;

use std::sync::Arc;

pub use dir::DirNode;
pub use file::{FileNode, FileState};
pub use root::RootNode;

use crate::error::VfsError;
use crate::inode::{DirEntry, INodeId, NodeAttr, NodeKind, ROOT_INODE};

/// A node reachable through the inode table.
#[derive(Clone)]
pub enum Node {
    /// The mount root, listing projects.
    Root(Arc<RootNode>),
    /// A project directory, listing recipes.
    Directory(Arc<DirNode>),
    /// A recipe file.
    File(Arc<FileNode>),
}

impl Node {
    pub fn inode(&self) -> INodeId {
        match self {
            Node::Root(_) => ROOT_INODE,
            Node::Directory(dir) => dir.inode(),
            Node::File(file) => file.inode(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Root(_) | Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    /// Inode of the containing directory (the root is its own parent).
    pub fn parent(&self) -> INodeId {
        match self {
            Node::Root(_) | Node::Directory(_) => ROOT_INODE,
            Node::File(file) => file.parent(),
        }
    }

    /// Current attributes; a closed file may fetch its payload to size itself.
    pub fn attributes(&self) -> Result<NodeAttr, VfsError> {
        match self {
            Node::Root(root) => Ok(root.attributes()),
            Node::Directory(dir) => Ok(dir.attributes()),
            Node::File(file) => file.attributes(),
        }
    }

    /// Resolve a child by name.
    ///
    /// # Arguments
    /// * `name` - Entry name within this directory
    pub fn lookup(&self, name: &str) -> Result<Node, VfsError> {
        match self {
            Node::Root(root) => root.lookup(name).map(Node::Directory),
            Node::Directory(dir) => dir.lookup(name).map(Node::File),
            Node::File(file) => Err(VfsError::NotADirectory(file.inode())),
        }
    }

    /// Refresh and list the children of a directory.
    pub fn list_entries(&self) -> Result<Vec<DirEntry>, VfsError> {
        match self {
            Node::Root(root) => root.list_entries(),
            Node::Directory(dir) => dir.list_entries(),
            Node::File(file) => Err(VfsError::NotADirectory(file.inode())),
        }
    }

    /// The file behind this node, or `IsADirectory`.
    pub fn as_file(&self) -> Result<&Arc<FileNode>, VfsError> {
        match self {
            Node::File(file) => Ok(file),
            other => Err(VfsError::IsADirectory(other.inode())),
        }
    }

    /// Name of the entry in its parent (empty for the root).
    pub fn name(&self) -> String {
        match self {
            Node::Root(_) => String::new(),
            Node::Directory(dir) => dir.name(),
            Node::File(file) => file.name(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("inode", &self.inode())
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
