//! Dataiku DSS project and recipe access for dssfs.
//!
//! This crate is the remote side of the filesystem. It provides:
//!
//! - **[`RecipeSource`]** - the four blocking operations the filesystem needs
//!   (list projects, list recipes, fetch a payload, save a payload)
//! - **[`DssClient`]** - the HTTP implementation against the DSS public API
//! - **[`MemoryRecipeSource`]** - an in-process implementation for tests
//! - **[`DssConfig`]** - the `~/.dataiku/config.json` user configuration

mod client;
mod config;
mod error;
mod memory;
mod model;
mod traits;

pub use client::{ClientOptions, DssClient, DEFAULT_TIMEOUT};
pub use config::{DssConfig, InstanceParams, USER_CONFIG_PATH};
pub use error::ApiError;
pub use memory::{MemoryRecipeSource, SavedPayload};
pub use model::{
    ModificationTag, ProjectSnapshot, RecipePayload, RecipeSnapshot, UserRef,
    EDITABLE_RECIPE_TYPES,
};
pub use traits::RecipeSource;
