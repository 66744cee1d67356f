//! FUSE view of Dataiku DSS projects and their code recipes.
//!
//! Every project appears as a directory under the mount root and every
//! python, scala or R recipe as a file inside it. Listings are fetched from
//! DSS on demand; file content is loaded on open and saved back on flush.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE Interface (fuser::Filesystem impl, feature "fuse")
//! Layer 2: RecipeFs (inode-addressed lookup, list, open, read, write, flush)
//! Layer 1: Nodes (RootNode, DirNode, FileNode) over a RecipeSource
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dssfs_api::{DssClient, ClientOptions};
//! use dssfs_vfs::{RecipeFs, VfsOptions};
//!
//! let client = DssClient::connect(url, api_key, &ClientOptions::default())?;
//! let fs = Arc::new(RecipeFs::new(Arc::new(client), VfsOptions::default()));
//! let vfs = dssfs_vfs::DssVfs::new(fs)?;
//! dssfs_vfs::mount(vfs, "/mnt/dss".as_ref())?;
//! ```

mod context;
pub mod error;
pub mod fs;
pub mod inode;
pub mod node;
pub mod options;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use error::VfsError;
pub use fs::{RecipeFs, VfsStats};
pub use inode::{DirEntry, HandleId, INodeId, NodeAttr, NodeKind, CLOSED_HANDLE, ROOT_INODE};
pub use node::{DirNode, FileNode, FileState, Node, RootNode};
pub use options::{VfsOptions, DEFAULT_ATTR_TTL, DEFAULT_CACHE_TTL};

#[cfg(feature = "fuse")]
pub use fuse::{mount, spawn_mount, DssVfs};
