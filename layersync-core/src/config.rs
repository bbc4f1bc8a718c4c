//! YAML service configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.layersync/
//!   config.yaml   (credentials, data source, layers)
//!   daemon.sock   (control socket while the runtime is up)
//! ```
//!
//! # API pattern
//!
//! Path-dependent functions have two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Credentials may be supplied out of band through `LAYERSYNC_USERNAME` and
//! `LAYERSYNC_PASSWORD`; those override the file.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{LayerConfig, LayerName};

pub const USERNAME_ENV: &str = "LAYERSYNC_USERNAME";
pub const PASSWORD_ENV: &str = "LAYERSYNC_PASSWORD";

pub const DEFAULT_TOKEN_URL: &str = "https://www.arcgis.com/sharing/rest/generateToken";
pub const DEFAULT_REFERER: &str = "http://127.0.0.1";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_referer() -> String {
    DEFAULT_REFERER.to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

// ---------------------------------------------------------------------------
// 1. Config structs
// ---------------------------------------------------------------------------

/// Account with edit rights on every configured layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Relational data source the layer queries run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DataSourceConfig {
    /// SQLite database file.
    #[serde(default)]
    pub database: PathBuf,
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    /// How long shutdown waits for in-flight cycles before aborting them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

// ---------------------------------------------------------------------------
// 2. Paths + load
// ---------------------------------------------------------------------------

/// `<home>/.layersync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".layersync").join("config.yaml")
}

/// Load `<home>/.layersync/config.yaml` with environment overrides applied.
pub fn load_at(home: &Path) -> Result<ServiceConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<ServiceConfig, ConfigError> {
    load_at(&home()?)
}

/// Load a configuration file from an explicit path.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let mut config = parse_file(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn parse_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

impl ServiceConfig {
    /// Replace credentials with non-empty values from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(USERNAME_ENV).filter(|v| !v.trim().is_empty()) {
            self.credentials.username = username;
        }
        if let Some(password) = lookup(PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.credentials.password = password;
        }
    }

    /// Problems that prevent any worker from starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.username.trim().is_empty() {
            return Err(ConfigError::MissingCredential("username"));
        }
        if self.credentials.password.is_empty() {
            return Err(ConfigError::MissingCredential("password"));
        }
        if self.data_source.database.as_os_str().is_empty() {
            return Err(ConfigError::MissingDataSource);
        }
        if self.layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        Ok(())
    }

    /// Split layers into those that can run and the per-layer problems that
    /// exclude the rest. A repeated name keeps its first occurrence.
    pub fn partition_layers(&self) -> (Vec<LayerConfig>, Vec<ConfigError>) {
        let mut usable = Vec::new();
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for layer in &self.layers {
            if let Err(err) = check_layer(layer) {
                problems.push(err);
                continue;
            }
            if !seen.insert(layer.name.clone()) {
                problems.push(ConfigError::DuplicateLayer {
                    layer: layer.name.clone(),
                });
                continue;
            }
            usable.push(layer.clone());
        }

        (usable, problems)
    }
}

fn check_layer(layer: &LayerConfig) -> Result<(), ConfigError> {
    let missing = |field| ConfigError::MissingLayerField {
        layer: layer.name.clone(),
        field,
    };
    if layer.name.0.trim().is_empty() {
        return Err(missing("name"));
    }
    if layer.admin_url.trim().is_empty() {
        return Err(missing("admin_url"));
    }
    if layer.layer_url.trim().is_empty() {
        return Err(missing("layer_url"));
    }
    if layer.query.trim().is_empty() {
        return Err(missing("query"));
    }
    if layer.poll_interval_secs == 0 {
        return Err(ConfigError::InvalidPollInterval {
            layer: layer.name.clone(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Shared admin endpoints
// ---------------------------------------------------------------------------

/// Whether `layer`'s admin URL is referenced by more than one of `layers`.
pub fn is_shared_admin(layers: &[LayerConfig], layer: &LayerConfig) -> bool {
    layers.iter().filter(|l| l.shares_admin_with(layer)).count() > 1
}

/// Admin URLs referenced by more than one layer, each listed once with the
/// names of the layers that share it.
pub fn shared_admin_endpoints(layers: &[LayerConfig]) -> Vec<(String, Vec<LayerName>)> {
    let mut endpoints: Vec<(String, Vec<LayerName>)> = Vec::new();
    for layer in layers {
        match endpoints
            .iter_mut()
            .find(|(url, _)| url.eq_ignore_ascii_case(&layer.admin_url))
        {
            Some((_, names)) => names.push(layer.name.clone()),
            None => endpoints.push((layer.admin_url.clone(), vec![layer.name.clone()])),
        }
    }
    endpoints.retain(|(_, names)| names.len() > 1);
    endpoints
}

// ---------------------------------------------------------------------------
// 5. Internal helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
