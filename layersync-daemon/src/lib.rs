//! layersync daemon: remote client, per-layer workers and the control socket.
//!
//! - [`remote`]: the feature service seam and its HTTP client
//! - [`token`], [`capability`], [`submit`]: the pieces of one sync cycle
//! - [`worker`]: the cycle itself
//! - [`runtime`]: task supervision, shutdown and the control socket
//! - [`protocol`]: control socket messages and the blocking client

pub mod capability;
pub mod context;
mod error;
#[cfg(test)]
mod fake;
pub mod paths;
pub mod protocol;
pub mod remote;
pub mod runtime;
pub mod status;
pub mod submit;
pub mod token;
pub mod worker;

pub use context::SharedContext;
pub use error::DaemonError;
pub use protocol::{exchange, request_status, request_stop, ControlReply, ControlRequest};
pub use remote::{ArcGisClient, FeatureService, RemoteError, TokenEndpoint};
pub use runtime::{init_tracing, run, run_with_context, start_blocking};
pub use status::{LayerStatus, StatusReport, WorkerPhase};
pub use submit::{EditSummary, KindTally};
pub use worker::{CycleOutcome, LayerWorker};
