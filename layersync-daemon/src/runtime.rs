use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use layersync_core::{config, ConfigError, LayerConfig, ServiceConfig};
use layersync_sync::SqliteSource;

use crate::context::SharedContext;
use crate::error::{io_err, DaemonError};
use crate::paths::{
    layersync_root, socket_path, HTTP_TIMEOUT, LOG_FORMAT_ENV, NOT_EDITABLE_RETRY_DELAY,
};
use crate::protocol::{ControlReply, ControlRequest};
use crate::remote::{ArcGisClient, TokenEndpoint};
use crate::status::{StatusReport, WorkerPhase};
use crate::worker::{CycleOutcome, LayerWorker};

/// Start the runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: ServiceConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(home.to_path_buf(), config));
    // Cycles still blocked on I/O after the grace period are abandoned.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Validate `config`, then run one worker per usable layer against the live
/// service until `stop` or ctrl-c.
pub async fn run(home: PathBuf, config: ServiceConfig) -> Result<(), DaemonError> {
    config.validate()?;
    let (layers, problems) = config.partition_layers();
    for problem in &problems {
        tracing::error!(error = %problem, "skipping layer");
    }
    if layers.is_empty() {
        return Err(ConfigError::NoLayers.into());
    }

    let ctx = Arc::new(SharedContext::new(
        Arc::new(ArcGisClient::new(HTTP_TIMEOUT)),
        Arc::new(SqliteSource::new(config.data_source.database.clone())),
        TokenEndpoint {
            url: config.token_url.clone(),
            referer: config.referer.clone(),
            credentials: config.credentials.clone(),
        },
        NOT_EDITABLE_RETRY_DELAY,
    ));
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    run_with_context(home, layers, ctx, grace).await
}

/// Run workers for `layers` on an explicit context.
pub async fn run_with_context(
    home: PathBuf,
    layers: Vec<LayerConfig>,
    ctx: Arc<SharedContext>,
    grace: Duration,
) -> Result<(), DaemonError> {
    let root = layersync_root(&home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    let started_at = Utc::now();

    for (admin_url, names) in config::shared_admin_endpoints(&layers) {
        let names: Vec<_> = names.iter().map(ToString::to_string).collect();
        tracing::info!(
            admin_url = %admin_url,
            layers = %names.join(", "),
            "admin endpoint shared; capability changes are coordinated"
        );
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let stop = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::with_capacity(layers.len());
    for layer in &layers {
        let shared = config::is_shared_admin(&layers, layer);
        let worker = LayerWorker::new(layer.clone(), shared, Arc::clone(&ctx));
        let stop = Arc::clone(&stop);
        let shutdown_rx = shutdown_tx.subscribe();
        workers.push(tokio::spawn(worker_task(worker, stop, shutdown_rx)));
    }
    tracing::info!(workers = workers.len(), "layer workers started");

    let supervisor_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        let stop = Arc::clone(&stop);
        tokio::spawn(supervise_workers(workers, stop, shutdown_rx, grace))
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let result =
                control_socket_task(home, ctx, shutdown.clone(), shutdown_rx, started_at).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (supervisor_result, socket_result, signal_result) =
        tokio::join!(supervisor_handle, socket_handle, signal_handle);

    for (task, joined) in [
        ("worker supervisor", supervisor_result),
        ("control socket", socket_result),
        ("signal handler", signal_result),
    ] {
        joined.map_err(|err| DaemonError::Protocol(format!("{task} task failed: {err}")))??;
    }
    Ok(())
}

/// Poll loop of one layer. Each cycle runs on the blocking pool; the sleep
/// between cycles ends early on shutdown.
async fn worker_task(
    mut worker: LayerWorker,
    stop: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let flag = Arc::clone(&stop);
        let (returned, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = worker.run_cycle(&flag);
            (worker, outcome)
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("layer cycle join failure: {err}")))?;
        worker = returned;

        match outcome {
            Ok(CycleOutcome::Completed(_)) => {}
            Ok(CycleOutcome::Stopped) => break,
            Err(err) => {
                worker.fail(&err);
                return Ok(());
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        worker.set_phase(WorkerPhase::Sleeping);
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(worker.poll_interval()) => {}
        }
    }

    worker.stop();
    Ok(())
}

/// Wait for shutdown, raise the stop flag, then give workers `grace` to
/// finish before aborting them.
async fn supervise_workers(
    mut workers: Vec<JoinHandle<Result<(), DaemonError>>>,
    stop: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    grace: Duration,
) -> Result<(), DaemonError> {
    let _ = shutdown_rx.recv().await;
    stop.store(true, Ordering::SeqCst);

    let deadline = tokio::time::Instant::now() + grace;
    let mut aborted = 0usize;
    for handle in workers.iter_mut() {
        match tokio::time::timeout_at(deadline, &mut *handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => tracing::error!(error = %err, "layer worker failed"),
            Ok(Err(err)) => tracing::error!(error = %err, "layer worker panicked"),
            Err(_) => {
                handle.abort();
                aborted += 1;
            }
        }
    }
    if aborted > 0 {
        tracing::warn!(
            aborted,
            grace_secs = grace.as_secs(),
            "layer workers did not finish within the grace period"
        );
    }
    Ok(())
}

async fn control_socket_task(
    home: PathBuf,
    ctx: Arc<SharedContext>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at: DateTime<Utc>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    claim_socket(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    fs::set_permissions(&socket, fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(&socket, e))?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = Arc::clone(&ctx);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    if let Err(err) =
                        serve_control_client(reader, writer, &ctx, &shutdown_tx, started_at).await
                    {
                        tracing::error!(error = %err, "control client error");
                    }
                });
            }
        }
    }

    let _ = fs::remove_file(&socket);
    Ok(())
}

/// Refuse to start beside a live runtime; remove a socket left by a dead one.
fn claim_socket(socket: &Path) -> Result<(), DaemonError> {
    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "layersync is already running on {}",
            socket.display()
        )));
    }
    match fs::remove_file(socket) {
        Ok(()) => {
            tracing::warn!(socket = %socket.display(), "removed stale control socket");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

/// Answer requests until the client hangs up or asks to stop. The stop reply
/// is written before shutdown is signalled.
async fn serve_control_client<R, W>(
    reader: R,
    mut writer: W,
    ctx: &SharedContext,
    shutdown_tx: &broadcast::Sender<()>,
    started_at: DateTime<Utc>,
) -> Result<(), DaemonError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(ControlRequest::Status) => ControlReply::Status(status_report(ctx, started_at)),
            Ok(ControlRequest::Stop) => ControlReply::Stopping {
                active_workers: ctx.editors.active(),
            },
            Err(err) => {
                tracing::warn!(error = %err, request = %line.trim(), "rejecting control request");
                ControlReply::Rejected {
                    reason: "unsupported request".to_string(),
                }
            }
        };

        let mut payload = serde_json::to_vec(&reply)?;
        payload.push(b'\n');
        writer
            .write_all(&payload)
            .await
            .map_err(|e| io_err("control socket", e))?;
        writer.flush().await.map_err(|e| io_err("control socket", e))?;

        if matches!(reply, ControlReply::Stopping { .. }) {
            tracing::info!("stop requested over the control socket");
            let _ = shutdown_tx.send(());
            break;
        }
    }
    Ok(())
}

fn status_report(ctx: &SharedContext, started_at: DateTime<Utc>) -> StatusReport {
    ctx.board
        .report(started_at, ctx.editors.active(), ctx.tokens.expires_at_ms())
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default and
/// `LAYERSYNC_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}
