//! Recipe file node and its open session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dssfs_api::RecipeSnapshot;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::context::VfsContext;
use crate::error::VfsError;
use crate::inode::{HandleId, INodeId, NodeAttr, NodeKind, CLOSED_HANDLE, FILE_PERMS};

/// Observable session state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No session; the buffer is empty.
    Closed,
    /// Open and matching the last load or save.
    OpenClean,
    /// Open with edits that have not been saved.
    OpenDirty,
}

/// Buffer and handle of the single open session.
#[derive(Default)]
struct FileSession {
    handle: HandleId,
    buffer: Vec<u8>,
    dirty: bool,
}

/// Whether an open is in progress and whether the parent has let go of the node.
#[derive(Default)]
struct OpenGate {
    opening: bool,
    detached: bool,
}

/// Last known payload length, reused for attributes while closed.
#[derive(Clone, Copy)]
struct SizeHint {
    size: u64,
    observed_at: Instant,
}

/// One recipe exposed as a regular file.
///
/// At most one session is open at a time. While open, reads and writes go to
/// an in-memory buffer that is saved back on flush.
pub struct FileNode {
    inode: INodeId,
    /// Inode of the owning project directory.
    parent: INodeId,
    ctx: Arc<VfsContext>,
    recipe: RwLock<RecipeSnapshot>,
    /// Mirror of `session.handle`, readable without the session lock.
    handle: AtomicU64,
    session: Mutex<FileSession>,
    gate: Mutex<OpenGate>,
    size_hint: Mutex<Option<SizeHint>>,
    retired: AtomicBool,
}

impl FileNode {
    /// Create a closed file node with a freshly allocated inode.
    ///
    /// # Arguments
    /// * `ctx` - Shared filesystem context
    /// * `parent` - Inode of the project directory
    /// * `recipe` - Descriptive snapshot of the recipe
    pub(crate) fn new(ctx: Arc<VfsContext>, parent: INodeId, recipe: RecipeSnapshot) -> Arc<Self> {
        let inode: INodeId = ctx.ids.next_inode();
        Arc::new(Self {
            inode,
            parent,
            ctx,
            recipe: RwLock::new(recipe),
            handle: AtomicU64::new(CLOSED_HANDLE),
            session: Mutex::new(FileSession::default()),
            gate: Mutex::new(OpenGate::default()),
            size_hint: Mutex::new(None),
            retired: AtomicBool::new(false),
        })
    }

    pub fn inode(&self) -> INodeId {
        self.inode
    }

    pub fn parent(&self) -> INodeId {
        self.parent
    }

    /// File name, equal to the recipe name.
    pub fn name(&self) -> String {
        self.recipe.read().name.clone()
    }

    /// Copy of the current recipe snapshot.
    pub fn recipe(&self) -> RecipeSnapshot {
        self.recipe.read().clone()
    }

    /// Handle of the open session, or [`CLOSED_HANDLE`].
    pub fn handle(&self) -> HandleId {
        self.handle.load(Ordering::SeqCst)
    }

    /// Whether a session is open or an open is still loading the payload.
    pub fn is_open(&self) -> bool {
        self.handle() != CLOSED_HANDLE || self.gate.lock().opening
    }

    pub fn state(&self) -> FileState {
        let session = self.session.lock();
        match (session.handle, session.dirty) {
            (CLOSED_HANDLE, _) => FileState::Closed,
            (_, false) => FileState::OpenClean,
            (_, true) => FileState::OpenDirty,
        }
    }

    /// Whether the recipe vanished remotely while this node stayed reachable.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn revive(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    /// Let go of the node unless a session is open or being opened.
    ///
    /// Once detached, the node can no longer be opened.
    ///
    /// # Returns
    /// Whether the node was detached.
    pub(crate) fn detach(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.opening || self.handle() != CLOSED_HANDLE {
            return false;
        }
        gate.detached = true;
        true
    }

    /// Undo a [`detach`](Self::detach) whose removal did not go through.
    pub(crate) fn reattach(&self) {
        self.gate.lock().detached = false;
    }

    /// Replace the descriptive snapshot; the session is untouched.
    ///
    /// A new modification time invalidates the remembered size.
    pub(crate) fn reload_recipe(&self, recipe: RecipeSnapshot) {
        let mut current = self.recipe.write();
        if current.modified_on() != recipe.modified_on() {
            *self.size_hint.lock() = None;
        }
        *current = recipe;
    }

    /// Current attributes.
    ///
    /// Size is the buffer length while open. While closed it comes from a
    /// size hint younger than the listing staleness window, or from fetching
    /// the payload.
    pub fn attributes(&self) -> Result<NodeAttr, VfsError> {
        let size: u64 = self.current_size()?;
        let recipe = self.recipe.read();
        Ok(NodeAttr {
            inode: self.inode,
            kind: NodeKind::File,
            perm: FILE_PERMS,
            uid: self.ctx.uid,
            gid: self.ctx.gid,
            crtime: recipe.created_on(),
            ctime: recipe.created_on(),
            mtime: recipe.modified_on(),
            size,
        })
    }

    fn current_size(&self) -> Result<u64, VfsError> {
        {
            let session = self.session.lock();
            if session.handle != CLOSED_HANDLE {
                return Ok(session.buffer.len() as u64);
            }
        }

        let hint: Option<SizeHint> = *self.size_hint.lock();
        match hint {
            Some(hint) if hint.observed_at.elapsed() < self.ctx.options.cache_ttl => Ok(hint.size),
            _ => {
                let content: Vec<u8> = self.load()?;
                let size: u64 = content.len() as u64;
                self.remember_size(size);
                Ok(size)
            }
        }
    }

    fn remember_size(&self, size: u64) {
        *self.size_hint.lock() = Some(SizeHint {
            size,
            observed_at: Instant::now(),
        });
    }

    /// Open a session, loading the payload into the buffer.
    ///
    /// # Returns
    /// The new handle. Fails with `ConcurrentOpenRejected` if already open.
    pub fn open(&self) -> Result<HandleId, VfsError> {
        let mut session = self.session.lock();
        if session.handle != CLOSED_HANDLE {
            warn!(
                "Rejecting open of inode {}: already open with handle {}",
                self.inode, session.handle
            );
            return Err(VfsError::ConcurrentOpenRejected {
                inode: self.inode,
                handle: session.handle,
            });
        }

        {
            let mut gate = self.gate.lock();
            if gate.detached {
                debug!("Inode {} was dropped from its project; not opening", self.inode);
                return Err(VfsError::NotFound(self.name()));
            }
            gate.opening = true;
        }

        let content: Vec<u8> = match self.load() {
            Ok(content) => content,
            Err(e) => {
                self.gate.lock().opening = false;
                return Err(e);
            }
        };
        let handle: HandleId = self.ctx.ids.next_handle();
        let size: u64 = content.len() as u64;
        session.buffer = content;
        session.dirty = false;
        session.handle = handle;
        self.handle.store(handle, Ordering::SeqCst);
        self.gate.lock().opening = false;
        drop(session);

        self.remember_size(size);
        info!("Opened {} (inode {}) with handle {}", self.name(), self.inode, handle);
        Ok(handle)
    }

    /// Lock the session after checking `handle` is the open one.
    fn checked_session(&self, handle: HandleId) -> Result<MutexGuard<'_, FileSession>, VfsError> {
        let session = self.session.lock();
        if session.handle == CLOSED_HANDLE || session.handle != handle {
            warn!(
                "Handle {} does not match session {} on inode {}",
                handle, session.handle, self.inode
            );
            return Err(VfsError::ProtocolMisuse {
                inode: self.inode,
                handle,
            });
        }
        Ok(session)
    }

    /// Read from the buffer.
    ///
    /// # Arguments
    /// * `handle` - Handle returned by `open`
    /// * `offset` - Byte offset; at or past the end yields an empty slice
    /// * `size` - Maximum bytes to return
    pub fn read(&self, handle: HandleId, offset: u64, size: u32) -> Result<Vec<u8>, VfsError> {
        let session = self.checked_session(handle)?;
        let len: u64 = session.buffer.len() as u64;
        if offset >= len {
            return Ok(Vec::new());
        }
        let end: u64 = offset.saturating_add(size as u64).min(len);
        Ok(session.buffer[offset as usize..end as usize].to_vec())
    }

    /// Write into the buffer.
    ///
    /// Data at or past the end is appended. Otherwise the buffer is cut at
    /// `offset` and `data` appended, dropping whatever followed.
    ///
    /// # Returns
    /// Number of bytes accepted (always `data.len()`).
    pub fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> Result<u32, VfsError> {
        if !self.ctx.options.allow_writes {
            warn!("Write to inode {} rejected: writes are disabled", self.inode);
            return Err(VfsError::WritesDisabled);
        }

        let mut session = self.checked_session(handle)?;
        if offset < session.buffer.len() as u64 {
            session.buffer.truncate(offset as usize);
        }
        session.buffer.extend_from_slice(data);
        session.dirty = true;
        debug!(
            "Wrote {} bytes at {} to inode {}",
            data.len(),
            offset,
            self.inode
        );
        Ok(data.len() as u32)
    }

    /// Save the buffer if it has unsaved edits.
    pub fn flush(&self, handle: HandleId) -> Result<(), VfsError> {
        let mut session = self.checked_session(handle)?;
        self.flush_session(&mut session)
    }

    fn flush_session(&self, session: &mut FileSession) -> Result<(), VfsError> {
        if !session.dirty {
            return Ok(());
        }
        self.save(&session.buffer)?;
        session.dirty = false;
        Ok(())
    }

    /// End the session, saving first when `flush` is set.
    ///
    /// A failed save leaves the session open and dirty.
    pub fn release(&self, handle: HandleId, flush: bool) -> Result<(), VfsError> {
        let mut session = self.checked_session(handle)?;
        if flush {
            self.flush_session(&mut session)?;
        } else if session.dirty {
            warn!(
                "Discarding unsaved edits to inode {} on release of handle {}",
                self.inode, handle
            );
        }

        let size: u64 = session.buffer.len() as u64;
        *session = FileSession::default();
        self.handle.store(CLOSED_HANDLE, Ordering::SeqCst);
        drop(session);

        self.remember_size(size);
        info!("Released handle {} on inode {}", handle, self.inode);
        Ok(())
    }

    fn load(&self) -> Result<Vec<u8>, VfsError> {
        let recipe: RecipeSnapshot = self.recipe();
        match self.ctx.fetch_payload(&recipe.project_key, &recipe.name) {
            Ok(payload) => Ok(payload.into_bytes()),
            Err(e) => {
                error!(
                    "Failed to load payload of {}/{}: {}",
                    recipe.project_key, recipe.name, e
                );
                Err(e.into())
            }
        }
    }

    fn save(&self, content: &[u8]) -> Result<(), VfsError> {
        let text: &str =
            std::str::from_utf8(content).map_err(|_| VfsError::InvalidContent(self.inode))?;
        let recipe: RecipeSnapshot = self.recipe();
        match self
            .ctx
            .source
            .save_payload(&recipe.project_key, &recipe.name, text)
        {
            Ok(()) => {
                info!(
                    "Saved {} bytes to {}/{}",
                    content.len(),
                    recipe.project_key,
                    recipe.name
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to save payload of {}/{}: {}",
                    recipe.project_key, recipe.name, e
                );
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for FileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNode")
            .field("inode", &self.inode)
            .field("parent", &self.parent)
            .field("name", &self.name())
            .field("handle", &self.handle())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}
