//! `layersync status`: per-layer worker visibility.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use layersync_daemon::paths::socket_path;
use layersync_daemon::{request_status, DaemonError, LayerStatus, StatusReport, WorkerPhase};

use super::home_dir;

/// Arguments for `layersync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        let report = match request_status(&home) {
            Ok(report) => report,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                if self.json {
                    let payload = serde_json::json!({
                        "running": false,
                        "socket": socket_path(&home).display().to_string(),
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&payload)
                            .context("failed to render status JSON")?
                    );
                } else {
                    println!("layersync is not running");
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query layersync status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render status JSON")?
            );
            return Ok(());
        }

        print_table(&report);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "layer")]
    layer: String,
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "capability")]
    capability: String,
    #[tabled(rename = "cycles")]
    cycles: u64,
    #[tabled(rename = "snapshot")]
    snapshot: String,
    #[tabled(rename = "last cycle")]
    last_cycle: String,
    #[tabled(rename = "last error")]
    last_error: String,
}

fn print_table(report: &StatusReport) {
    println!(
        "layersync v{} | up since {} | {} layers | {} active workers | {}",
        env!("CARGO_PKG_VERSION"),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.layers.len(),
        report.active_workers,
        token_summary(report.token_expires_at_ms, now_ms()),
    );

    if report.layers.is_empty() {
        println!("No layers configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = report.layers.iter().map(table_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let terminated = report
        .layers
        .iter()
        .filter(|l| l.phase == WorkerPhase::Terminated)
        .count();
    if terminated > 0 {
        println!(
            "{}",
            format!("{terminated} layer worker(s) terminated; restart layersync to resume them.")
                .red()
        );
    }
}

fn table_row(status: &LayerStatus) -> StatusTableRow {
    let mut layer = status.layer.to_string();
    if status.shared_admin {
        layer.push_str(" (shared)");
    }
    StatusTableRow {
        layer,
        mode: status.comparison_mode.to_string(),
        phase: phase_label(status.phase),
        capability: status.capability.to_string(),
        cycles: status.cycles,
        snapshot: status
            .snapshot_size
            .map_or_else(|| "-".to_string(), |n| n.to_string()),
        last_cycle: status.last_cycle_at.map_or_else(
            || "never".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        last_error: status.last_error.clone().unwrap_or_default(),
    }
}

fn phase_label(phase: WorkerPhase) -> String {
    match phase {
        WorkerPhase::Terminated => phase.as_str().red().bold().to_string(),
        WorkerPhase::Sleeping | WorkerPhase::Idle => phase.as_str().green().to_string(),
        _ => phase.as_str().yellow().to_string(),
    }
}

fn token_summary(expires_at_ms: Option<i64>, now_ms: i64) -> String {
    match expires_at_ms {
        None => "no token yet".to_string(),
        Some(expires) if expires <= now_ms => "token expired".to_string(),
        Some(expires) => format!("token valid for {}m", (expires - now_ms) / 60_000),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
