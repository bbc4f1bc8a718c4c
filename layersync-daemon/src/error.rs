use std::path::PathBuf;

use thiserror::Error;

use layersync_core::LayerName;

use crate::remote::RemoteError;

/// Error surface for the remote client, layer workers, runtime and protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] layersync_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] layersync_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport failure talking to the remote service.
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("unreadable response from {url}: {detail}")]
    MalformedResponse { url: String, detail: String },

    #[error("token request failed: {0}")]
    Token(String),

    /// Explicit error payload returned by the remote service.
    #[error("{operation} on layer '{layer}' failed - {error}")]
    Remote {
        layer: LayerName,
        operation: &'static str,
        error: RemoteError,
    },

    #[error("{operation} on layer '{layer}' still not editable after {attempts} retries")]
    RetriesExhausted {
        layer: LayerName,
        operation: &'static str,
        attempts: u32,
    },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
