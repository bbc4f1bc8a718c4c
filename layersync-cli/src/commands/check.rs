//! `layersync check`: validate `config.yaml` without starting any worker.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use layersync_core::{config, LayerConfig};

use super::{home_dir, ConfigArg};

/// Arguments for `layersync check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Tabled)]
struct LayerRow {
    #[tabled(rename = "layer")]
    name: String,
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "every")]
    interval: String,
    #[tabled(rename = "wkid")]
    wkid: u32,
    #[tabled(rename = "clear on seed")]
    clear: bool,
    #[tabled(rename = "admin")]
    admin: String,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let path = self.config.path(&home);
        let config = self.config.load(&home)?;

        if let Err(err) = config.validate() {
            bail!("{}: {err}", path.display());
        }
        let (layers, problems) = config.partition_layers();

        println!("configuration: {}", path.display());
        println!("data source:   {}", config.data_source.database.display());

        if !layers.is_empty() {
            let rows: Vec<LayerRow> = layers
                .iter()
                .map(|layer| LayerRow {
                    name: layer.name.to_string(),
                    mode: layer.comparison_mode.to_string(),
                    interval: format!("{}s", layer.poll_interval_secs),
                    wkid: layer.wkid,
                    clear: layer.clear_before_seed,
                    admin: if config::is_shared_admin(&layers, layer) {
                        "shared".to_string()
                    } else {
                        "own".to_string()
                    },
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        for (admin_url, names) in config::shared_admin_endpoints(&layers) {
            let names: Vec<_> = names.iter().map(ToString::to_string).collect();
            println!("shared admin endpoint {admin_url}: {}", names.join(", "));
        }

        for layer in &layers {
            if let Some(warning) = ordering_warning(layer) {
                println!("{} {warning}", "warning:".yellow().bold());
            }
        }

        for problem in &problems {
            println!("{} {problem}", "error:".red().bold());
        }
        if !problems.is_empty() {
            bail!(
                "{} layer problem(s); {} of {} layer(s) would run",
                problems.len(),
                layers.len(),
                config.layers.len()
            );
        }
        if layers.is_empty() {
            bail!("no layer would run");
        }

        println!("{}", format!("{} layer(s) ready", layers.len()).green());
        Ok(())
    }
}

/// Positional identity needs a stable row order between polls.
fn ordering_warning(layer: &LayerConfig) -> Option<String> {
    if layer.comparison_mode.keyed_by_source_id() {
        return None;
    }
    let query = layer
        .query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    if query.contains("order by") {
        return None;
    }
    Some(format!(
        "layer '{}' identifies rows by position ({}) but its query has no ORDER BY",
        layer.name, layer.comparison_mode
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::{ComparisonMode, LayerName};
    use rstest::rstest;

    fn layer(query: &str, mode: ComparisonMode) -> LayerConfig {
        LayerConfig {
            name: LayerName::from("hydrants"),
            admin_url: "https://a".into(),
            layer_url: "https://l".into(),
            query: query.into(),
            wkid: 4326,
            poll_interval_secs: 60,
            comparison_mode: mode,
            clear_before_seed: true,
        }
    }

    #[rstest]
    #[case("SELECT id, x, y FROM t", ComparisonMode::GeometryOnly, true)]
    #[case("select id, x, y from t order by id", ComparisonMode::GeometryOnly, false)]
    #[case("SELECT id, name FROM t", ComparisonMode::NoGeometryAndId, false)]
    #[case("SELECT name FROM t", ComparisonMode::NoGeometry, true)]
    #[case("SELECT id, x, y FROM t\nORDER\n  BY id", ComparisonMode::GeometryOnly, false)]
    #[case("SELECT name FROM t ORDER\tBY  name", ComparisonMode::NoGeometry, false)]
    fn warns_on_unordered_positional_queries(
        #[case] query: &str,
        #[case] mode: ComparisonMode,
        #[case] warns: bool,
    ) {
        assert_eq!(ordering_warning(&layer(query, mode)).is_some(), warns);
    }
}
