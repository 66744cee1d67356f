//! User configuration for connecting to DSS instances.
//!
//! The configuration lives at `~/.dataiku/config.json`, shared with the other
//! Dataiku developer tools:
//!
//! ```json
//! {
//!   "dss_instances": {
//!     "default": {"url": "https://dss.example.com", "api_key": "..."}
//!   },
//!   "default_instance": "default"
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;

/// Location of the user configuration relative to the home directory.
pub const USER_CONFIG_PATH: &str = ".dataiku/config.json";

/// Connection parameters for one DSS instance.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceParams {
    /// Base URL of the instance.
    pub url: String,
    /// Personal or global API key.
    pub api_key: String,
}

impl std::fmt::Debug for InstanceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceParams")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Parsed user configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssConfig {
    /// Known instances by name.
    #[serde(rename = "dss_instances", default)]
    pub instances: HashMap<String, InstanceParams>,
    /// Name of the instance to use when none is given.
    #[serde(default)]
    pub default_instance: Option<String>,
}

impl DssConfig {
    /// Load a configuration file.
    ///
    /// # Arguments
    /// * `path` - Path to a JSON config file
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        debug!("Loading DSS config from {}", path.display());
        let metadata: fs::Metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(ApiError::InvalidConfig(format!(
                "config file not found at {}",
                path.display()
            )));
        }

        let text: String = fs::read_to_string(path)?;
        let config: DssConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Path of the user configuration file.
    pub fn user_config_path() -> Result<PathBuf, ApiError> {
        let home: PathBuf = dirs::home_dir()
            .ok_or_else(|| ApiError::InvalidConfig("home directory not found".to_string()))?;
        Ok(home.join(USER_CONFIG_PATH))
    }

    /// Load the configuration from the user's home directory.
    pub fn load_user() -> Result<Self, ApiError> {
        let path: PathBuf = Self::user_config_path()?;
        Self::load(&path)
    }

    /// Look up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&InstanceParams> {
        self.instances.get(name)
    }

    /// The instance named by `default_instance`.
    ///
    /// # Returns
    /// None if no default is named or the named instance is not defined.
    pub fn default_instance(&self) -> Option<&InstanceParams> {
        let name: &str = self.default_instance.as_deref()?;
        self.instance(name)
    }
}
