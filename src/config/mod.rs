//! Configuration management for the global notifier.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Config file (optional, required when a path is given)
//! 3. Environment variables prefixed with `NOTIFIER` (highest priority)
//!

mod control;
pub use control::*;


//---
use std::path::Path;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::constants::ADMIN_REALM_FILE;
use crate::constants::REGULAR_REALMS_DIR;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifierConfig {
    /// Root of the local replicas: `admin.realm` plus `realms/<id>.realm`
    #[serde(default = "default_local_root_dir")]
    pub local_root_dir: PathBuf,

    /// Base URL of the sync server, e.g. `realm://127.0.0.1:9080/`
    #[serde(default = "default_server_base_url")]
    pub server_base_url: String,

    /// Token handed to every session opened by the notifier
    #[serde(default)]
    pub access_token: String,

    /// Control loop tuning
    #[serde(default)]
    pub control: ControlConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            local_root_dir: default_local_root_dir(),
            server_base_url: default_server_base_url(),
            access_token: String::new(),
            control: ControlConfig::default(),
        }
    }
}

impl NotifierConfig {
    pub fn new(
        local_root_dir: impl Into<PathBuf>,
        server_base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            local_root_dir: local_root_dir.into(),
            server_base_url: server_base_url.into(),
            access_token: access_token.into(),
            control: ControlConfig::default(),
        }
    }

    /// Load configuration from defaults, an optional file and environment variables.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a config file (any format `config` understands)
    ///
    /// # Returns
    /// Merged and validated configuration
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Environment variables (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("NOTIFIER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the whole configuration tree
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rule is violated
    pub fn validate(&self) -> Result<()> {
        if self.local_root_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("local_root_dir path cannot be empty".into()));
        }

        let base = Url::parse(&self.server_base_url).map_err(|e| {
            Error::InvalidConfig(format!(
                "server_base_url {:?} is not a valid URL: {}",
                self.server_base_url, e
            ))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "server_base_url {:?} cannot carry a realm path",
                self.server_base_url
            )));
        }

        self.control.validate()?;

        Ok(())
    }

    pub fn admin_realm_path(&self) -> PathBuf {
        self.local_root_dir.join(ADMIN_REALM_FILE)
    }

    pub fn regular_realms_dir(&self) -> PathBuf {
        self.local_root_dir.join(REGULAR_REALMS_DIR)
    }

    pub fn with_local_root_dir(
        mut self,
        local_root_dir: impl AsRef<Path>,
    ) -> Self {
        self.local_root_dir = local_root_dir.as_ref().to_path_buf();
        self
    }
}

fn default_local_root_dir() -> PathBuf {
    PathBuf::from("/tmp/global-notifier")
}
fn default_server_base_url() -> String {
    "realm://127.0.0.1:9080/".to_string()
}
