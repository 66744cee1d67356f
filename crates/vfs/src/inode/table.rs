//! Inode table for resolving inode numbers handed back by the kernel.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::types::INodeId;
use crate::node::Node;

/// Index from inode ID to live node.
///
/// Only the root and directory refreshes insert or remove entries; the
/// dispatch layer just reads.
#[derive(Default)]
pub struct NodeTable {
    /// All reachable nodes by ID.
    nodes: RwLock<HashMap<INodeId, Node>>,
}

impl NodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a node by ID.
    ///
    /// # Arguments
    /// * `id` - Inode ID to look up
    pub fn get(&self, id: INodeId) -> Option<Node> {
        self.nodes.read().get(&id).cloned()
    }

    /// Register a node under its own inode ID.
    pub(crate) fn insert(&self, node: Node) {
        self.nodes.write().insert(node.inode(), node);
    }

    /// Forget several nodes under one write lock.
    pub(crate) fn remove_all(&self, ids: &[INodeId]) {
        let mut nodes = self.nodes.write();
        for id in ids {
            nodes.remove(id);
        }
    }

    /// Get the total number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the table has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl std::fmt::Debug for NodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTable")
            .field("len", &self.len())
            .finish()
    }
}
