//! Records read from the data source and reconciled with the remote layer.

use std::fmt;

use crate::types::ComparisonMode;

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A typed scalar read from one source column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Date/time column, kept as the source rendered it.
    Timestamp(String),
}

impl FieldData {
    /// Numeric view used for coordinate columns.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldData::Integer(i) => Some(*i as f64),
            FieldData::Float(f) => Some(*f),
            FieldData::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the remote wire format quotes this value.
    pub fn is_quoted(&self) -> bool {
        matches!(self, FieldData::Text(_) | FieldData::Timestamp(_))
    }
}

impl fmt::Display for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldData::Null => Ok(()),
            FieldData::Text(s) | FieldData::Timestamp(s) => f.write_str(s),
            FieldData::Integer(i) => i.fmt(f),
            FieldData::Float(v) => v.fmt(f),
            FieldData::Boolean(b) => b.fmt(f),
        }
    }
}

/// A named column value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub data: FieldData,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, data: FieldData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Field values of one row, in query column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields(Vec<FieldValue>);

impl Fields {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldValue> {
        self.0.iter()
    }

    pub fn at(&self, index: usize) -> Option<&FieldValue> {
        self.0.get(index)
    }

    /// Case-insensitive lookup by column name.
    pub fn get(&self, name: &str) -> Option<&FieldData> {
        self.0
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| &field.data)
    }

    /// Positional value comparison. Column names are not compared; a
    /// different column count is never equal.
    pub fn values_equal(&self, other: &Fields) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.data == b.data)
    }

    /// Overwrite values positionally from `other`; a changed column layout
    /// replaces the whole list.
    pub fn overwrite_with(&mut self, other: &Fields) {
        if self.0.len() != other.0.len() {
            self.0 = other.0.clone();
            return;
        }
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            mine.data = theirs.data.clone();
        }
    }
}

impl FromIterator<FieldValue> for Fields {
    fn from_iter<T: IntoIterator<Item = FieldValue>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a FieldValue;
    type IntoIter = std::slice::Iter<'a, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Feature records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One reconciled unit: a source row plus the identifiers the remote layer
/// assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub unique_id: String,
    pub point: Option<Point>,
    pub fields: Fields,
    /// Set only after the remote layer confirmed the add.
    pub object_id: Option<i64>,
    pub global_id: Option<String>,
}

impl FeatureRecord {
    pub fn new(unique_id: impl Into<String>, point: Option<Point>, fields: Fields) -> Self {
        Self {
            unique_id: unique_id.into(),
            point,
            fields,
            object_id: None,
            global_id: None,
        }
    }

    /// Equality under `mode`. Remote identifiers are never compared.
    pub fn matches(&self, other: &FeatureRecord, mode: ComparisonMode) -> bool {
        let coordinates_equal = !mode.compares_coordinates() || self.point == other.point;
        let attributes_equal = !mode.compares_attributes() || self.fields.values_equal(&other.fields);
        coordinates_equal && attributes_equal
    }

    /// Compare with `incoming` and, when unequal, take over its coordinates
    /// and field values while keeping the remote identifiers.
    ///
    /// Returns `true` when the records were already equal.
    pub fn reconcile_with(&mut self, incoming: &FeatureRecord, mode: ComparisonMode) -> bool {
        if self.matches(incoming, mode) {
            return true;
        }
        self.point = incoming.point;
        self.fields.overwrite_with(&incoming.fields);
        false
    }
}

/// Changes produced by one diff cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditBatch {
    pub adds: Vec<FeatureRecord>,
    pub updates: Vec<FeatureRecord>,
    pub deletes: Vec<FeatureRecord>,
}

impl EditBatch {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
