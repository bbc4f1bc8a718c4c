//! Error types for layersync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while querying the source and preparing edits.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The data source could not be opened, with annotated path for context.
    #[error("failed to open data source at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Statement preparation, execution, or row access failed.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("column '{column}' holds a blob value, which cannot be sent as an attribute")]
    UnsupportedColumn { column: String },

    #[error("row {row}: query returned no columns")]
    EmptyRow { row: usize },

    #[error("row {row}: query returned {found} column(s); coordinates are read from columns 2 and 3")]
    MissingCoordinateColumns { row: usize, found: usize },

    #[error("row {row}: column '{column}' value '{value}' is not a numeric coordinate")]
    InvalidCoordinate {
        row: usize,
        column: String,
        value: String,
    },

    /// Feature JSON serialization error.
    #[error("feature JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
