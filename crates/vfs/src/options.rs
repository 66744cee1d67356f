//! Configuration options for the recipe filesystem.

use std::time::Duration;

/// Default time a listing is trusted before a lookup refreshes it.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default kernel attribute/entry cache timeout.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Options for a mounted filesystem.
#[derive(Debug, Clone)]
pub struct VfsOptions {
    /// Staleness window for project and recipe listings used by lookups.
    pub cache_ttl: Duration,
    /// How long the kernel may cache attributes and entries.
    pub attr_ttl: Duration,
    /// Whether writes to recipe files are accepted.
    pub allow_writes: bool,
    /// Filesystem name shown in the mount table.
    pub fs_name: String,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            attr_ttl: DEFAULT_ATTR_TTL,
            allow_writes: false,
            fs_name: "dss".to_string(),
        }
    }
}

impl VfsOptions {
    /// Set the listing staleness window.
    ///
    /// # Arguments
    /// * `ttl` - Maximum age of a listing before a lookup refreshes it
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the kernel attribute cache timeout.
    pub fn with_attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Allow or forbid writes to recipe files.
    pub fn with_allow_writes(mut self, allow: bool) -> Self {
        self.allow_writes = allow;
        self
    }

    /// Set the filesystem name.
    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }
}
