//! Turn queried rows into feature records under a comparison mode.

use std::collections::HashSet;

use layersync_core::{ComparisonMode, FeatureRecord, Fields, Point};

use crate::error::SyncError;

/// Build one record per row.
///
/// The unique id is the first column rendered verbatim when the mode is keyed
/// by source id, otherwise the 1-based row position. Coordinate modes read x
/// and y from the second and third columns. Every column, including those,
/// stays in the record's fields. A repeated id keeps its first row.
pub fn to_records(rows: Vec<Fields>, mode: ComparisonMode) -> Result<Vec<FeatureRecord>, SyncError> {
    let mut records = Vec::with_capacity(rows.len());
    let mut seen = HashSet::with_capacity(rows.len());

    for (index, fields) in rows.into_iter().enumerate() {
        let position = index + 1;
        let unique_id = if mode.keyed_by_source_id() {
            fields
                .at(0)
                .map(|field| field.data.to_string())
                .ok_or(SyncError::EmptyRow { row: position })?
        } else {
            position.to_string()
        };

        let point = if mode.reads_coordinates() {
            Some(read_point(&fields, position)?)
        } else {
            None
        };

        if !seen.insert(unique_id.clone()) {
            tracing::warn!(
                unique_id = %unique_id,
                row = position,
                "duplicate source id; keeping the first row"
            );
            continue;
        }
        records.push(FeatureRecord::new(unique_id, point, fields));
    }

    Ok(records)
}

fn read_point(fields: &Fields, row: usize) -> Result<Point, SyncError> {
    let (Some(x), Some(y)) = (fields.at(1), fields.at(2)) else {
        return Err(SyncError::MissingCoordinateColumns {
            row,
            found: fields.len(),
        });
    };
    let coordinate = |field: &layersync_core::FieldValue| {
        field.data.as_f64().ok_or_else(|| SyncError::InvalidCoordinate {
            row,
            column: field.name.clone(),
            value: field.data.to_string(),
        })
    };
    Ok(Point {
        x: coordinate(x)?,
        y: coordinate(y)?,
    })
}
