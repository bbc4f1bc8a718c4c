pub mod check;
pub mod daemon;
pub mod preview;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use layersync_core::{config, ServiceConfig};

/// `--config` shared by the commands that read `config.yaml`.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArg {
    /// Configuration file (default: ~/.layersync/config.yaml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    pub fn path(&self, home: &std::path::Path) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| config::config_path_at(home))
    }

    pub fn load(&self, home: &std::path::Path) -> Result<ServiceConfig> {
        let path = self.path(home);
        config::load_from(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
