//! Error types for the VFS crate.

use dssfs_api::ApiError;
use thiserror::Error;

use crate::inode::{HandleId, INodeId};

/// Errors that can occur during VFS operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Name has no remote counterpart.
    #[error("No such entry: {0}")]
    NotFound(String),

    /// Inode is not (or no longer) known.
    #[error("Inode not found: {0}")]
    InodeNotFound(INodeId),

    /// Transport failure, bad status or malformed response.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(#[from] ApiError),

    /// Stale or mismatched handle, or the file is not open.
    #[error("Operation not supported on inode {inode} with handle {handle}")]
    ProtocolMisuse {
        /// Inode the call was made on.
        inode: INodeId,
        /// Handle supplied by the caller.
        handle: HandleId,
    },

    /// The file already has an open session.
    #[error("Inode {inode} is already open with handle {handle}")]
    ConcurrentOpenRejected {
        /// Inode the open was attempted on.
        inode: INodeId,
        /// Handle of the outstanding session.
        handle: HandleId,
    },

    /// Writes are turned off by policy.
    #[error("Writes are disabled")]
    WritesDisabled,

    /// Buffer content cannot be saved as text.
    #[error("Content of inode {0} is not valid UTF-8")]
    InvalidContent(INodeId),

    /// Not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(INodeId),

    /// Not a file.
    #[error("Is a directory: {0}")]
    IsADirectory(INodeId),

    /// Mount operation failed.
    #[error("Mount failed: {0}")]
    MountFailed(String),
}

impl VfsError {
    /// The errno reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) | VfsError::InodeNotFound(_) => libc::ENOENT,
            VfsError::RemoteUnavailable(_) | VfsError::InvalidContent(_) => libc::EIO,
            VfsError::ProtocolMisuse { .. } => libc::ENOTSUP,
            VfsError::ConcurrentOpenRejected { .. } => libc::EBUSY,
            VfsError::WritesDisabled => libc::EROFS,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::IsADirectory(_) => libc::EISDIR,
            VfsError::MountFailed(_) => libc::EIO,
        }
    }
}
