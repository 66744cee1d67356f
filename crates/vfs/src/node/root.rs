//! Root directory node listing one directory per project.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dssfs_api::ProjectSnapshot;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::dir::entry_name;
use super::{DirNode, Node};
use crate::context::VfsContext;
use crate::error::VfsError;
use crate::inode::{DirEntry, INodeId, NodeAttr, NodeKind, DIR_PERMS, ROOT_INODE};

#[derive(Default)]
struct RootState {
    dirs: HashMap<String, Arc<DirNode>>,
    refreshed_at: Option<Instant>,
}

/// The mount root.
pub struct RootNode {
    ctx: Arc<VfsContext>,
    state: Mutex<RootState>,
}

impl RootNode {
    pub(crate) fn new(ctx: Arc<VfsContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            state: Mutex::new(RootState::default()),
        })
    }

    pub fn inode(&self) -> INodeId {
        ROOT_INODE
    }

    pub fn attributes(&self) -> NodeAttr {
        NodeAttr {
            inode: ROOT_INODE,
            kind: NodeKind::Directory,
            perm: DIR_PERMS,
            uid: self.ctx.uid,
            gid: self.ctx.gid,
            crtime: self.ctx.mounted_at,
            ctime: self.ctx.mounted_at,
            mtime: self.ctx.mounted_at,
            size: 0,
        }
    }

    /// Resolve a project directory by name.
    ///
    /// Refreshes first when no projects are known or the listing is stale.
    pub fn lookup(&self, name: &str) -> Result<Arc<DirNode>, VfsError> {
        let mut state = self.state.lock();
        if state.dirs.is_empty() || self.ctx.is_stale(state.refreshed_at) {
            self.refresh(&mut state)?;
        }
        match state.dirs.get(name) {
            Some(dir) if !dir.is_retired() => Ok(dir.clone()),
            _ => {
                debug!("No project {}", name);
                Err(VfsError::NotFound(name.to_string()))
            }
        }
    }

    /// Refresh from the remote and list projects, sorted by name.
    pub fn list_entries(&self) -> Result<Vec<DirEntry>, VfsError> {
        let mut state = self.state.lock();
        self.refresh(&mut state)?;

        let mut entries: Vec<DirEntry> = state
            .dirs
            .values()
            .filter(|dir| !dir.is_retired())
            .map(|dir| DirEntry {
                inode: dir.inode(),
                name: dir.name(),
                kind: NodeKind::Directory,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn refresh(&self, state: &mut RootState) -> Result<(), VfsError> {
        let projects: Vec<ProjectSnapshot> = match self.ctx.source.list_projects() {
            Ok(projects) => projects,
            Err(e) => {
                error!("Failed to list projects: {}", e);
                return Err(e.into());
            }
        };

        let mut fresh: HashMap<String, ProjectSnapshot> = HashMap::with_capacity(projects.len());
        for project in projects {
            match fresh.entry(entry_name(&project)) {
                Entry::Vacant(slot) => {
                    slot.insert(project);
                }
                Entry::Occupied(slot) => warn!(
                    "Skipping project {}: its name {:?} is already used by {}",
                    project.project_key,
                    slot.key(),
                    slot.get().project_key
                ),
            }
        }

        let mut dropped: usize = 0;
        let mut replaced: Vec<(String, ProjectSnapshot)> = Vec::new();
        state.dirs.retain(|name, dir| {
            match fresh.remove(name) {
                Some(project) if project.project_key == dir.project_key() => {
                    dir.update_snapshot(project);
                    dir.revive();
                    return true;
                }
                Some(project) => replaced.push((name.clone(), project)),
                None => {}
            }

            if dir.try_forget() {
                dropped += 1;
                false
            } else {
                debug!("Retiring project {} with open files", name);
                dir.retire();
                true
            }
        });

        // A name now used by another project is taken over once the old
        // directory has been dropped.
        for (name, project) in replaced {
            if state.dirs.contains_key(&name) {
                warn!(
                    "Project {} waits for open files of the previous {:?} to close",
                    project.project_key, name
                );
            } else {
                fresh.insert(name, project);
            }
        }

        for (name, project) in fresh {
            let dir: Arc<DirNode> = DirNode::new(self.ctx.clone(), project);
            self.ctx.table.insert(Node::Directory(dir.clone()));
            state.dirs.insert(name, dir);
        }

        state.refreshed_at = Some(Instant::now());
        info!(
            "Refreshed projects: {} listed, {} dropped",
            state.dirs.len(),
            dropped
        );
        Ok(())
    }

    /// Current project directories, without refreshing.
    pub fn dirs(&self) -> Vec<Arc<DirNode>> {
        self.state.lock().dirs.values().cloned().collect()
    }

    /// Drop retired directories that no longer have open files.
    ///
    /// # Returns
    /// Number of directories dropped.
    pub(crate) fn collect_retired(&self) -> usize {
        let mut state = self.state.lock();
        let mut dropped: usize = 0;
        state.dirs.retain(|_, dir| {
            if dir.is_retired() && dir.try_forget() {
                dropped += 1;
                false
            } else {
                true
            }
        });
        if dropped > 0 {
            debug!("Dropped {} retired projects", dropped);
        }
        dropped
    }
}

impl std::fmt::Debug for RootNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootNode").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileNode;
    use crate::options::VfsOptions;
    use dssfs_api::{MemoryRecipeSource, RecipeSnapshot};

    fn create_test_root() -> (Arc<MemoryRecipeSource>, Arc<VfsContext>, Arc<RootNode>) {
        let source: Arc<MemoryRecipeSource> = Arc::new(MemoryRecipeSource::new());
        source.add_project(ProjectSnapshot::new("ZETA", "Zeta"));
        source.add_project(ProjectSnapshot::new("ALPHA", "Alpha"));

        let ctx: Arc<VfsContext> = Arc::new(VfsContext::new(source.clone(), VfsOptions::default()));
        let root: Arc<RootNode> = RootNode::new(ctx.clone());
        (source, ctx, root)
    }

    #[test]
    fn test_list_sorted_by_name() {
        let (_source, _ctx, root) = create_test_root();
        let entries: Vec<DirEntry> = root.list_entries().unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert!(entries.iter().all(|e| e.kind == NodeKind::Directory));
    }

    #[test]
    fn test_first_lookup_populates() {
        let (source, ctx, root) = create_test_root();
        let dir: Arc<DirNode> = root.lookup("Zeta").unwrap();
        assert_eq!(dir.project_key(), "ZETA");
        assert!(ctx.table.get(dir.inode()).is_some());

        assert!(matches!(root.lookup("MISSING"), Err(VfsError::NotFound(_))));
        assert_eq!(source.list_project_calls(), 1);
    }

    #[test]
    fn test_refresh_keeps_inodes() {
        let (source, _ctx, root) = create_test_root();
        let before: Arc<DirNode> = root.lookup("Alpha").unwrap();

        let mut updated: ProjectSnapshot = ProjectSnapshot::new("ALPHA", "Alpha");
        updated.project_type = "REGULAR".to_string();
        source.add_project(updated);
        root.list_entries().unwrap();

        let after: Arc<DirNode> = root.lookup("Alpha").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.snapshot().project_type, "REGULAR");
    }

    #[test]
    fn test_renamed_project_gets_new_directory() {
        let (source, ctx, root) = create_test_root();
        let before: Arc<DirNode> = root.lookup("Alpha").unwrap();

        source.add_project(ProjectSnapshot::new("ALPHA", "Alpha v2"));
        let names: Vec<String> = root.list_entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Alpha v2".to_string(), "Zeta".to_string()]);

        let after: Arc<DirNode> = root.lookup("Alpha v2").unwrap();
        assert_ne!(before.inode(), after.inode());
        assert_eq!(after.project_key(), "ALPHA");
        assert!(ctx.table.get(before.inode()).is_none());
    }

    #[test]
    fn test_vanished_project_forgotten() {
        let (source, ctx, root) = create_test_root();
        source.add_recipe(RecipeSnapshot::new("ZETA", "job.py", "python"), "");
        let dir: Arc<DirNode> = root.lookup("Zeta").unwrap();
        let file_inode = dir.lookup("job.py").unwrap().inode();

        source.remove_project("ZETA");
        root.list_entries().unwrap();
        assert!(ctx.table.get(dir.inode()).is_none());
        assert!(ctx.table.get(file_inode).is_none());
    }

    #[test]
    fn test_project_with_open_file_retired() {
        let (source, ctx, root) = create_test_root();
        source.add_recipe(RecipeSnapshot::new("ZETA", "job.py", "python"), "x");
        let dir: Arc<DirNode> = root.lookup("Zeta").unwrap();
        let file = dir.lookup("job.py").unwrap();
        let fh = file.open().unwrap();

        source.remove_project("ZETA");
        let names: Vec<String> = root.list_entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Alpha".to_string()]);
        assert!(dir.is_retired());
        assert!(matches!(root.lookup("Zeta"), Err(VfsError::NotFound(_))));
        assert!(ctx.table.get(dir.inode()).is_some());

        file.release(fh, false).unwrap();
        assert_eq!(root.collect_retired(), 1);
        assert!(ctx.table.get(dir.inode()).is_none());
        assert!(ctx.table.get(file.inode()).is_none());
    }

    #[test]
    fn test_retired_project_revived() {
        let (source, _ctx, root) = create_test_root();
        source.add_recipe(RecipeSnapshot::new("ZETA", "job.py", "python"), "x");
        let dir: Arc<DirNode> = root.lookup("Zeta").unwrap();
        let fh = dir.lookup("job.py").unwrap().open().unwrap();
        assert_ne!(fh, 0);

        source.remove_project("ZETA");
        root.list_entries().unwrap();
        assert!(dir.is_retired());

        source.add_project(ProjectSnapshot::new("ZETA", "Zeta"));
        root.list_entries().unwrap();
        let again: Arc<DirNode> = root.lookup("Zeta").unwrap();
        assert!(!again.is_retired());
        assert_eq!(again.inode(), dir.inode());
    }

    #[test]
    fn test_duplicate_names_keep_first_project() {
        let (source, _ctx, root) = create_test_root();
        source.add_project(ProjectSnapshot::new("ALPHA_COPY", "Alpha"));

        let entries: Vec<DirEntry> = root.list_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(root.lookup("Alpha").unwrap().project_key(), "ALPHA");
    }

    #[test]
    fn test_name_taken_over_by_other_project() {
        let (source, ctx, root) = create_test_root();
        source.add_recipe(RecipeSnapshot::new("ALPHA", "old.py", "python"), "old");
        let before: Arc<DirNode> = root.lookup("Alpha").unwrap();
        let old: Arc<FileNode> = before.lookup("old.py").unwrap();
        let fh = old.open().unwrap();

        source.remove_project("ALPHA");
        source.add_project(ProjectSnapshot::new("BETA", "Alpha"));
        source.add_recipe(RecipeSnapshot::new("BETA", "new.py", "python"), "new");

        // The old directory keeps the name while its file is open.
        root.list_entries().unwrap();
        assert!(before.is_retired());
        assert_eq!(before.project_key(), "ALPHA");
        assert!(matches!(root.lookup("Alpha"), Err(VfsError::NotFound(_))));
        assert_eq!(old.read(fh, 0, 10).unwrap(), b"old");

        old.release(fh, false).unwrap();
        assert_eq!(root.collect_retired(), 1);
        assert!(ctx.table.get(old.inode()).is_none());

        root.list_entries().unwrap();
        let after: Arc<DirNode> = root.lookup("Alpha").unwrap();
        assert_ne!(after.inode(), before.inode());
        assert_eq!(after.project_key(), "BETA");
        assert!(after.lookup("new.py").is_ok());
        assert!(after.lookup("old.py").is_err());
    }

    #[test]
    fn test_name_taken_over_immediately_when_closed() {
        let (source, ctx, root) = create_test_root();
        let before: Arc<DirNode> = root.lookup("Alpha").unwrap();

        source.remove_project("ALPHA");
        source.add_project(ProjectSnapshot::new("BETA", "Alpha"));
        root.list_entries().unwrap();

        let after: Arc<DirNode> = root.lookup("Alpha").unwrap();
        assert_eq!(after.project_key(), "BETA");
        assert!(ctx.table.get(before.inode()).is_none());
    }

    #[test]
    fn test_failed_refresh_keeps_projects() {
        let (source, _ctx, root) = create_test_root();
        root.list_entries().unwrap();

        source.fail_lists(true);
        assert!(matches!(
            root.list_entries(),
            Err(VfsError::RemoteUnavailable(_))
        ));
        assert_eq!(root.dirs().len(), 2);
        assert!(root.lookup("Alpha").is_ok());
    }
}
