//! `layersync start` / `layersync stop`: foreground runtime lifecycle.

use anyhow::{Context, Result};

use layersync_daemon::{request_stop, start_blocking, DaemonError};

use super::{home_dir, ConfigArg};

pub fn start(args: ConfigArg) -> Result<()> {
    let home = home_dir()?;
    let config = args.load(&home)?;
    start_blocking(&home, config).context("layersync exited with error")
}

pub fn stop() -> Result<()> {
    let home = home_dir()?;
    match request_stop(&home) {
        Ok(active_workers) => {
            println!("stop requested; waiting on {active_workers} layer worker(s)")
        }
        Err(DaemonError::DaemonNotRunning { .. }) => println!("layersync is not running"),
        Err(err) => return Err(err).context("failed to stop layersync"),
    }
    Ok(())
}
