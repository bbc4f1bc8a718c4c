use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Pause before resubmitting an edit the remote layer rejected as not yet
/// editable.
pub const NOT_EDITABLE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Timeout applied to every remote HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub fn layersync_root(home: &Path) -> PathBuf {
    home.join(".layersync")
}

pub fn socket_path(home: &Path) -> PathBuf {
    layersync_root(home).join(DAEMON_SOCKET)
}

/// Set to `json` to log one JSON object per line.
pub const LOG_FORMAT_ENV: &str = "LAYERSYNC_LOG_FORMAT";
