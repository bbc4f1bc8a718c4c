//! Relational row sources.
//!
//! A [`RowSource`] runs one layer query and hands back every row as ordered
//! [`Fields`]. The SQLite implementation opens a read-only connection per
//! fetch and closes it when the rows are collected.

use std::path::{Path, PathBuf};

use rusqlite::{types::ValueRef, Connection, OpenFlags};

use layersync_core::{FieldData, FieldValue, Fields};

use crate::error::SyncError;

/// Source of rows for layer queries.
pub trait RowSource: Send + Sync {
    /// Run `query` and return each row's values in column order.
    fn fetch(&self, query: &str) -> Result<Vec<Fields>, SyncError>;
}

/// SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    database: PathBuf,
}

impl SqliteSource {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
        }
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    fn open(&self) -> Result<Connection, SyncError> {
        Connection::open_with_flags(
            &self.database,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| SyncError::Open {
            path: self.database.clone(),
            source,
        })
    }
}

impl RowSource for SqliteSource {
    fn fetch(&self, query: &str) -> Result<Vec<Fields>, SyncError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<(String, ColumnKind)> = stmt
            .columns()
            .iter()
            .map(|column| {
                (
                    column.name().to_string(),
                    ColumnKind::from_decl_type(column.decl_type()),
                )
            })
            .collect();

        let mut rows = stmt.query([])?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, (name, kind)) in columns.iter().enumerate() {
                let data = convert(row.get_ref(index)?, *kind, name)?;
                values.push(FieldValue::new(name.clone(), data));
            }
            fetched.push(Fields::new(values));
        }

        tracing::debug!(
            database = %self.database.display(),
            rows = fetched.len(),
            "source query completed"
        );
        Ok(fetched)
    }
}

/// Declared column affinity that SQLite storage classes alone cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Timestamp,
    Plain,
}

impl ColumnKind {
    fn from_decl_type(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return ColumnKind::Plain;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("BOOL") {
            ColumnKind::Boolean
        } else if decl.contains("DATE") || decl.contains("TIME") {
            ColumnKind::Timestamp
        } else {
            ColumnKind::Plain
        }
    }
}

fn convert(value: ValueRef<'_>, kind: ColumnKind, column: &str) -> Result<FieldData, SyncError> {
    let data = match value {
        ValueRef::Null => FieldData::Null,
        ValueRef::Integer(i) => match kind {
            ColumnKind::Boolean => FieldData::Boolean(i != 0),
            ColumnKind::Timestamp => FieldData::Timestamp(i.to_string()),
            ColumnKind::Plain => FieldData::Integer(i),
        },
        ValueRef::Real(f) => match kind {
            ColumnKind::Timestamp => FieldData::Timestamp(f.to_string()),
            _ => FieldData::Float(f),
        },
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match kind {
                ColumnKind::Timestamp => FieldData::Timestamp(text),
                ColumnKind::Boolean => match text.to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => FieldData::Boolean(true),
                    "false" | "f" | "no" | "n" | "0" => FieldData::Boolean(false),
                    _ => FieldData::Text(text),
                },
                ColumnKind::Plain => FieldData::Text(text),
            }
        }
        ValueRef::Blob(_) => {
            return Err(SyncError::UnsupportedColumn {
                column: column.to_string(),
            })
        }
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("source.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE hydrants (
                id INTEGER PRIMARY KEY,
                x REAL,
                y REAL,
                status TEXT,
                in_service BOOLEAN,
                inspected DATETIME,
                photo BLOB
            );
            INSERT INTO hydrants VALUES (1, -122.5, 37.7, 'open', 1, '2024-05-01 10:00:00', NULL);
            INSERT INTO hydrants VALUES (2, -122.6, 37.8, NULL, 0, NULL, x'00ff');",
        )
        .unwrap();
        path
    }

    #[test]
    fn fetch_preserves_column_order_and_types() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSource::new(seed(&dir));

        let rows = source
            .fetch("SELECT id, x, y, status, in_service, inspected FROM hydrants ORDER BY id")
            .unwrap();

        assert_eq!(rows.len(), 2);
        let names: Vec<_> = rows[0].iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "x", "y", "status", "in_service", "inspected"]);
        assert_eq!(rows[0].get("id"), Some(&FieldData::Integer(1)));
        assert_eq!(rows[0].get("x"), Some(&FieldData::Float(-122.5)));
        assert_eq!(rows[0].get("status"), Some(&FieldData::Text("open".into())));
        assert_eq!(rows[0].get("in_service"), Some(&FieldData::Boolean(true)));
        assert_eq!(
            rows[0].get("inspected"),
            Some(&FieldData::Timestamp("2024-05-01 10:00:00".into()))
        );
        assert_eq!(rows[1].get("status"), Some(&FieldData::Null));
        assert_eq!(rows[1].get("in_service"), Some(&FieldData::Boolean(false)));
    }

    #[test]
    fn blob_columns_are_rejected() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSource::new(seed(&dir));
        let err = source
            .fetch("SELECT id, photo FROM hydrants WHERE id = 2")
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedColumn { ref column } if column == "photo"));
    }

    #[test]
    fn missing_database_is_an_open_error() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSource::new(dir.path().join("absent.db"));
        let err = source.fetch("SELECT 1").unwrap_err();
        assert!(matches!(err, SyncError::Open { .. }), "got: {err}");
    }

    #[test]
    fn invalid_sql_is_a_query_error() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSource::new(seed(&dir));
        let err = source.fetch("SELECT nope FROM missing_table").unwrap_err();
        assert!(matches!(err, SyncError::Query(_)), "got: {err}");
    }
}
