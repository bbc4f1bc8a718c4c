//! layersync core library: domain types, records, configuration, errors.
//!
//! - [`types`]: layer configuration, comparison modes, capabilities
//! - [`record`]: field values, feature records, edit batches
//! - [`config`]: load / validate `config.yaml`
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::{Credentials, DataSourceConfig, ServiceConfig};
pub use error::ConfigError;
pub use record::{EditBatch, FeatureRecord, FieldData, FieldValue, Fields, Point};
pub use types::{Capability, ComparisonMode, LayerConfig, LayerName};
