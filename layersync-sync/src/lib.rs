//! # layersync-sync
//!
//! Source querying, snapshot diffing and feature encoding.
//!
//! Call [`poll_layer`] to query one layer's rows and diff them against its
//! [`Snapshot`], then [`FeatureEncoder::encode`] to turn the resulting
//! batch into `applyEdits` form parameters.

pub mod detector;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod snapshot;
pub mod source;
pub mod wire;

pub use error::SyncError;
pub use pipeline::{load_records, poll_layer};
pub use snapshot::Snapshot;
pub use source::{RowSource, SqliteSource};
pub use wire::{EditKind, EditPayload, FeatureEncoder};
