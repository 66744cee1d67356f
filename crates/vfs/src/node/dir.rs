//! Project directory node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dssfs_api::{ProjectSnapshot, RecipeSnapshot};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::{FileNode, Node};
use crate::context::VfsContext;
use crate::error::VfsError;
use crate::inode::{DirEntry, INodeId, NodeAttr, NodeKind, DIR_PERMS};

/// Name under which a project appears in the root listing.
///
/// The display name, with `/` replaced since it cannot appear in a path component.
pub(crate) fn entry_name(project: &ProjectSnapshot) -> String {
    project.name.replace('/', "_")
}

/// Children of a directory and when they were last refreshed.
#[derive(Default)]
struct DirState {
    files: HashMap<String, Arc<FileNode>>,
    refreshed_at: Option<Instant>,
}

/// One project exposed as a directory of editable recipes.
pub struct DirNode {
    inode: INodeId,
    ctx: Arc<VfsContext>,
    snapshot: RwLock<ProjectSnapshot>,
    state: Mutex<DirState>,
    retired: AtomicBool,
}

impl DirNode {
    /// Create an unpopulated directory with a freshly allocated inode.
    pub(crate) fn new(ctx: Arc<VfsContext>, snapshot: ProjectSnapshot) -> Arc<Self> {
        let inode: INodeId = ctx.ids.next_inode();
        Arc::new(Self {
            inode,
            ctx,
            snapshot: RwLock::new(snapshot),
            state: Mutex::new(DirState::default()),
            retired: AtomicBool::new(false),
        })
    }

    pub fn inode(&self) -> INodeId {
        self.inode
    }

    /// Directory name, derived from the project's display name.
    pub fn name(&self) -> String {
        entry_name(&self.snapshot.read())
    }

    pub fn project_key(&self) -> String {
        self.snapshot.read().project_key.clone()
    }

    /// Copy of the current project snapshot.
    pub fn snapshot(&self) -> ProjectSnapshot {
        self.snapshot.read().clone()
    }

    pub fn attributes(&self) -> NodeAttr {
        let snapshot = self.snapshot.read();
        NodeAttr {
            inode: self.inode,
            kind: NodeKind::Directory,
            perm: DIR_PERMS,
            uid: self.ctx.uid,
            gid: self.ctx.gid,
            crtime: snapshot.created_on(),
            ctime: snapshot.created_on(),
            mtime: snapshot.modified_on(),
            size: 0,
        }
    }

    /// Resolve a recipe file by name.
    ///
    /// Refreshes first when no recipes are known or the listing is stale.
    pub fn lookup(&self, name: &str) -> Result<Arc<FileNode>, VfsError> {
        let mut state = self.state.lock();
        if state.files.is_empty() || self.ctx.is_stale(state.refreshed_at) {
            self.refresh(&mut state)?;
        }
        match state.files.get(name) {
            Some(file) if !file.is_retired() => Ok(file.clone()),
            _ => {
                debug!("No recipe {} in project {}", name, self.inode);
                Err(VfsError::NotFound(name.to_string()))
            }
        }
    }

    /// Refresh from the remote and list editable recipes, sorted by name.
    pub fn list_entries(&self) -> Result<Vec<DirEntry>, VfsError> {
        let mut state = self.state.lock();
        self.refresh(&mut state)?;

        let mut entries: Vec<DirEntry> = state
            .files
            .values()
            .filter(|file| !file.is_retired())
            .map(|file| DirEntry {
                inode: file.inode(),
                name: file.name(),
                kind: NodeKind::File,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Merge the remote recipe list into `state`.
    ///
    /// Existing names keep their node; vanished names are dropped, or retired
    /// while a session is still open.
    fn refresh(&self, state: &mut DirState) -> Result<(), VfsError> {
        let project_key: String = self.project_key();
        let recipes: Vec<RecipeSnapshot> = match self.ctx.source.list_recipes(&project_key) {
            Ok(recipes) => recipes,
            Err(e) => {
                error!("Failed to list recipes of {}: {}", project_key, e);
                return Err(e.into());
            }
        };

        let mut fresh: HashMap<String, RecipeSnapshot> = recipes
            .into_iter()
            .filter(RecipeSnapshot::is_editable)
            .map(|recipe| (recipe.name.clone(), recipe))
            .collect();

        let mut removed: Vec<INodeId> = Vec::new();
        state.files.retain(|name, file| match fresh.remove(name) {
            Some(recipe) => {
                file.reload_recipe(recipe);
                file.revive();
                true
            }
            None if file.detach() => {
                removed.push(file.inode());
                false
            }
            None => {
                debug!("Retiring open file {} in {}", name, project_key);
                file.retire();
                true
            }
        });

        for (name, recipe) in fresh {
            let file: Arc<FileNode> = FileNode::new(self.ctx.clone(), self.inode, recipe);
            self.ctx.table.insert(Node::File(file.clone()));
            state.files.insert(name, file);
        }

        self.ctx.table.remove_all(&removed);
        state.refreshed_at = Some(Instant::now());
        info!(
            "Refreshed project {}: {} recipes, {} dropped",
            project_key,
            state.files.len(),
            removed.len()
        );
        Ok(())
    }

    /// Replace the project snapshot after a root refresh.
    pub(crate) fn update_snapshot(&self, snapshot: ProjectSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Whether any file in this directory has an open session.
    pub fn has_open_handles(&self) -> bool {
        self.state.lock().files.values().any(|file| file.is_open())
    }

    /// Current file nodes, without refreshing.
    pub fn files(&self) -> Vec<Arc<FileNode>> {
        self.state.lock().files.values().cloned().collect()
    }

    /// Whether the project vanished remotely while this node stayed reachable.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn revive(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    /// Drop retired files that no longer have an open session.
    ///
    /// # Returns
    /// Number of files dropped.
    pub(crate) fn collect_retired(&self) -> usize {
        let mut state = self.state.lock();
        let mut removed: Vec<INodeId> = Vec::new();
        state.files.retain(|_, file| {
            if file.is_retired() && file.detach() {
                removed.push(file.inode());
                false
            } else {
                true
            }
        });
        self.ctx.table.remove_all(&removed);
        if !removed.is_empty() {
            debug!("Dropped {} retired files from {}", removed.len(), self.inode);
        }
        removed.len()
    }

    /// Remove this directory and all of its files from the inode table,
    /// unless one of the files is open or being opened.
    ///
    /// # Returns
    /// Whether the directory was removed.
    pub(crate) fn try_forget(&self) -> bool {
        let mut state = self.state.lock();
        let mut detached: Vec<&Arc<FileNode>> = Vec::with_capacity(state.files.len());
        for file in state.files.values() {
            if !file.detach() {
                detached.iter().for_each(|file| file.reattach());
                return false;
            }
            detached.push(file);
        }

        let mut ids: Vec<INodeId> = detached.iter().map(|file| file.inode()).collect();
        ids.push(self.inode);
        state.files.clear();
        state.refreshed_at = None;
        self.ctx.table.remove_all(&ids);
        true
    }
}

impl std::fmt::Debug for DirNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirNode")
            .field("inode", &self.inode)
            .field("project_key", &self.project_key())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}
