//! Error types for layersync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::LayerName;

/// All errors that can arise from loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.layersync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("{0} of the user permitted to edit the feature layers is not configured")]
    MissingCredential(&'static str),

    #[error("data source database is not configured")]
    MissingDataSource,

    #[error("no feature layers are configured")]
    NoLayers,

    #[error("layer '{layer}': {field} is not configured")]
    MissingLayerField {
        layer: LayerName,
        field: &'static str,
    },

    #[error("layer '{layer}' is configured more than once")]
    DuplicateLayer { layer: LayerName },

    #[error("layer '{layer}': poll interval must be at least one second")]
    InvalidPollInterval { layer: LayerName },
}
