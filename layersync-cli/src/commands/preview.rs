//! `layersync preview`: local dry run of a layer's first cycle.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use layersync_core::LayerName;
use layersync_sync::{load_records, EditKind, FeatureEncoder, SqliteSource};

use super::{home_dir, ConfigArg};

/// Arguments for `layersync preview`.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Configured layer name.
    pub layer: String,

    #[command(flatten)]
    pub config: ConfigArg,

    /// Print at most this many features.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

impl PreviewArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = self.config.load(&home)?;

        let name = LayerName::from(self.layer.as_str());
        let layer = config
            .layers
            .iter()
            .find(|l| l.name == name)
            .with_context(|| format!("layer '{name}' is not configured"))?;

        let source = SqliteSource::new(config.data_source.database.clone());
        let records = load_records(&source, layer)
            .with_context(|| format!("failed to run the query of layer '{name}'"))?;

        let encoder = FeatureEncoder::new(layer);
        let features: Vec<Value> = records
            .iter()
            .take(self.limit)
            .filter_map(|record| encoder.feature(record, EditKind::Add))
            .collect();

        eprintln!(
            "{name}: {} record(s), showing {} as {} adds",
            records.len(),
            features.len(),
            layer.comparison_mode
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&Value::Array(features))
                .context("failed to render feature JSON")?
        );
        Ok(())
    }
}
