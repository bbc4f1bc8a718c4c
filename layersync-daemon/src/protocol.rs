//! Control socket messages and the blocking client the CLI uses.
//!
//! One JSON object per line in each direction; a connection may carry several
//! exchanges and ends after `stop`.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::status::StatusReport;

/// A freshly started runtime may not have bound its socket yet.
const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Status(StatusReport),
    /// Shutdown has been signalled; `active_workers` were still registered.
    Stopping { active_workers: usize },
    Rejected { reason: String },
}

impl ControlReply {
    fn unexpected(self, request: ControlRequest) -> DaemonError {
        match self {
            ControlReply::Rejected { reason } => DaemonError::Protocol(reason),
            other => DaemonError::Protocol(format!("unexpected reply to {request:?}: {other:?}")),
        }
    }
}

/// Send `request` and read the single reply line.
pub fn exchange(home: &Path, request: ControlRequest) -> Result<ControlReply, DaemonError> {
    let socket = socket_path(home);
    let stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => DaemonError::DaemonNotRunning {
            socket: socket.clone(),
        },
        _ => io_err(&socket, err),
    })?;

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    (&stream)
        .write_all(line.as_bytes())
        .map_err(|e| io_err(&socket, e))?;

    let mut reply = String::new();
    BufReader::new(&stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(&socket, e))?;
    if reply.trim().is_empty() {
        return Err(DaemonError::Protocol(
            "daemon closed the connection without replying".to_string(),
        ));
    }
    Ok(serde_json::from_str(&reply)?)
}

pub fn request_status(home: &Path) -> Result<StatusReport, DaemonError> {
    let mut attempt = 1;
    loop {
        match exchange(home, ControlRequest::Status) {
            Ok(ControlReply::Status(report)) => return Ok(report),
            Ok(other) => return Err(other.unexpected(ControlRequest::Status)),
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Ask the runtime to shut down; returns the number of workers it is
/// waiting on.
pub fn request_stop(home: &Path) -> Result<usize, DaemonError> {
    match exchange(home, ControlRequest::Stop)? {
        ControlReply::Stopping { active_workers } => Ok(active_workers),
        other => Err(other.unexpected(ControlRequest::Stop)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use super::*;
    use crate::paths::layersync_root;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_reports_not_running() {
        let home = TempDir::new().expect("home");
        let err = request_status(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn messages_are_tagged_json_lines() {
        assert_eq!(
            serde_json::to_string(&ControlRequest::Stop).unwrap(),
            r#"{"cmd":"stop"}"#
        );
        assert_eq!(
            serde_json::to_string(&ControlReply::Stopping { active_workers: 2 }).unwrap(),
            r#"{"reply":"stopping","active_workers":2}"#
        );
        assert!(serde_json::from_str::<ControlRequest>(r#"{"cmd":"sync"}"#).is_err());
    }

    #[test]
    fn rejected_reply_surfaces_its_reason() {
        let home = TempDir::new().expect("home");
        fs::create_dir_all(layersync_root(home.path())).expect("root");
        let listener = UnixListener::bind(socket_path(home.path())).expect("bind");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut request = String::new();
            BufReader::new(&stream).read_line(&mut request).expect("read");
            (&stream)
                .write_all(b"{\"reply\":\"rejected\",\"reason\":\"unsupported request\"}\n")
                .expect("write");
            request
        });

        let err = request_stop(home.path()).unwrap_err();
        assert!(matches!(&err, DaemonError::Protocol(reason) if reason == "unsupported request"));
        assert_eq!(server.join().expect("server"), "{\"cmd\":\"stop\"}\n");
    }
}
