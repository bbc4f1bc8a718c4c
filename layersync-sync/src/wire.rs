//! Feature JSON for `applyEdits`.
//!
//! Adds and updates are JSON arrays of
//! `{geometry:{x,y,spatialReference:{wkid}}, attributes:{…, LAST_UPDATED}}`;
//! deletes are a comma-separated list of object ids.

use chrono::{DateTime, Local, TimeZone};
use serde_json::{json, Map, Value};

use layersync_core::{ComparisonMode, EditBatch, FeatureRecord, FieldData, LayerConfig};

use crate::error::SyncError;

pub const OBJECT_ID_FIELD: &str = "OBJECTID";
pub const LAST_UPDATED_FIELD: &str = "LAST_UPDATED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Add,
    Update,
    Delete,
}

impl EditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EditKind::Add => "add",
            EditKind::Update => "update",
            EditKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded form parameters for one `applyEdits` call. Empty strings mean
/// the kind is absent from the batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditPayload {
    pub adds: String,
    pub updates: String,
    pub deletes: String,
}

/// Encodes records for one layer.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    mode: ComparisonMode,
    wkid: u32,
    stamp: String,
}

impl FeatureEncoder {
    /// Encoder stamped with the current local time.
    pub fn new(layer: &LayerConfig) -> Self {
        Self {
            mode: layer.comparison_mode,
            wkid: layer.wkid,
            stamp: last_updated_stamp(&Local::now()),
        }
    }

    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = stamp.into();
        self
    }

    pub fn encode(&self, batch: &EditBatch) -> Result<EditPayload, SyncError> {
        Ok(EditPayload {
            adds: self.feature_array(&batch.adds, EditKind::Add)?,
            updates: self.feature_array(&batch.updates, EditKind::Update)?,
            deletes: delete_list(&batch.deletes),
        })
    }

    /// Whether features of `kind` carry a geometry object.
    pub fn has_geometry(&self, kind: EditKind) -> bool {
        match self.mode {
            ComparisonMode::GeometryOnly | ComparisonMode::GeometryAndAttributes => true,
            ComparisonMode::AttributesOnly => kind == EditKind::Add,
            ComparisonMode::NoGeometry | ComparisonMode::NoGeometryAndId => false,
        }
    }

    /// One feature object, or `None` when an update has no object id to
    /// address. Deletes are not features; see [`EditPayload::deletes`].
    pub fn feature(&self, record: &FeatureRecord, kind: EditKind) -> Option<Value> {
        let mut attributes = Map::new();

        if kind == EditKind::Update {
            let object_id = record.object_id?;
            attributes.insert(OBJECT_ID_FIELD.to_string(), json!(object_id));
        }
        if !(kind == EditKind::Update && self.mode == ComparisonMode::GeometryOnly) {
            for field in &record.fields {
                attributes.insert(field.name.clone(), field_json(&field.data));
            }
        }
        attributes.insert(LAST_UPDATED_FIELD.to_string(), json!(self.stamp));

        let mut feature = Map::new();
        if self.has_geometry(kind) {
            if let Some(point) = record.point {
                feature.insert(
                    "geometry".to_string(),
                    json!({
                        "x": point.x,
                        "y": point.y,
                        "spatialReference": { "wkid": self.wkid },
                    }),
                );
            }
        }
        feature.insert("attributes".to_string(), Value::Object(attributes));
        Some(Value::Object(feature))
    }

    fn feature_array(&self, records: &[FeatureRecord], kind: EditKind) -> Result<String, SyncError> {
        if records.is_empty() {
            return Ok(String::new());
        }
        let features: Vec<Value> = records
            .iter()
            .filter_map(|record| {
                let feature = self.feature(record, kind);
                if feature.is_none() {
                    tracing::warn!(
                        unique_id = %record.unique_id,
                        "record has no object id yet; left out of {kind}s"
                    );
                }
                feature
            })
            .collect();
        if features.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(&features)?)
    }
}

/// JSON value for one field. Text and timestamps are strings; non-finite
/// floats become `null`.
pub fn field_json(data: &FieldData) -> Value {
    match data {
        FieldData::Null => Value::Null,
        FieldData::Text(s) | FieldData::Timestamp(s) => Value::String(s.clone()),
        FieldData::Integer(i) => json!(i),
        FieldData::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldData::Boolean(b) => Value::Bool(*b),
    }
}

/// `1/5/2024 3:04:05 PM` style general date/time.
pub fn last_updated_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%-m/%-d/%Y %-I:%M:%S %p").to_string()
}

fn delete_list(records: &[FeatureRecord]) -> String {
    let ids: Vec<String> = records
        .iter()
        .filter_map(|record| {
            if record.object_id.is_none() {
                tracing::warn!(
                    unique_id = %record.unique_id,
                    "record has no object id yet; left out of deletes"
                );
            }
            record.object_id.map(|id| id.to_string())
        })
        .collect();
    ids.join(",")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
