//! Change detection between the snapshot and freshly queried records.

use std::collections::HashSet;

use layersync_core::{ComparisonMode, EditBatch, FeatureRecord};

use crate::snapshot::Snapshot;

/// Diff `incoming` against `snapshot`, mutating the snapshot to match.
///
/// With no snapshot yet, every incoming record is an add and the snapshot is
/// seeded from them.
pub fn detect_changes(
    snapshot: &mut Option<Snapshot>,
    incoming: Vec<FeatureRecord>,
    mode: ComparisonMode,
) -> EditBatch {
    match snapshot {
        Some(existing) => diff_against(existing, incoming, mode),
        None => {
            let seeded = Snapshot::from_records(incoming);
            let batch = EditBatch {
                adds: seeded.records().to_vec(),
                ..EditBatch::default()
            };
            *snapshot = Some(seeded);
            batch
        }
    }
}

/// Diff against an established snapshot.
///
/// - unseen id: add, also appended to the snapshot
/// - seen id, unequal under `mode`: the snapshot record is overwritten with
///   the incoming values and a copy of it (remote ids included) is an update
/// - snapshot id absent from `incoming`: delete, removed from the snapshot
pub fn diff_against(
    snapshot: &mut Snapshot,
    incoming: Vec<FeatureRecord>,
    mode: ComparisonMode,
) -> EditBatch {
    let mut batch = EditBatch::default();
    let mut present: HashSet<String> = HashSet::with_capacity(incoming.len());

    for record in incoming {
        if !present.insert(record.unique_id.clone()) {
            continue;
        }
        match snapshot.get_mut(&record.unique_id) {
            Some(existing) => {
                if !existing.reconcile_with(&record, mode) {
                    batch.updates.push(existing.clone());
                }
            }
            None => {
                snapshot.insert(record.clone());
                batch.adds.push(record);
            }
        }
    }

    batch.deletes = snapshot.retain_ids(|id| present.contains(id));
    batch
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::{FieldData, FieldValue, Fields, Point};

    fn record(id: &str, x: f64, status: &str) -> FeatureRecord {
        FeatureRecord::new(
            id,
            Some(Point { x, y: 0.0 }),
            Fields::new(vec![FieldValue::new(
                "STATUS",
                FieldData::Text(status.to_string()),
            )]),
        )
    }

    #[test]
    fn first_cycle_seeds_and_adds_everything() {
        let mut snapshot = None;
        let batch = detect_changes(
            &mut snapshot,
            vec![record("1", 1.0, "a"), record("2", 2.0, "b")],
            ComparisonMode::GeometryOnly,
        );
        assert_eq!(batch.adds.len(), 2);
        assert!(batch.updates.is_empty() && batch.deletes.is_empty());
        assert_eq!(snapshot.as_ref().map(Snapshot::len), Some(2));
    }

    #[test]
    fn empty_first_query_seeds_an_empty_snapshot() {
        let mut snapshot = None;
        let batch = detect_changes(&mut snapshot, Vec::new(), ComparisonMode::NoGeometry);
        assert!(batch.is_empty());
        assert_eq!(snapshot, Some(Snapshot::default()));
    }

    #[test]
    fn update_carries_existing_remote_ids() {
        let mut seeded = record("1", 1.0, "a");
        seeded.object_id = Some(11);
        let mut snapshot = Snapshot::from_records(vec![seeded]);

        let batch = diff_against(
            &mut snapshot,
            vec![record("1", 5.0, "a")],
            ComparisonMode::GeometryOnly,
        );

        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].object_id, Some(11));
        assert_eq!(batch.updates[0].point, Some(Point { x: 5.0, y: 0.0 }));
        assert_eq!(snapshot.get("1").unwrap().point, Some(Point { x: 5.0, y: 0.0 }));
    }

    #[test]
    fn unchanged_rows_produce_nothing() {
        let mut snapshot = Snapshot::from_records(vec![record("1", 1.0, "a")]);
        let batch = diff_against(
            &mut snapshot,
            vec![record("1", 1.0, "a")],
            ComparisonMode::GeometryAndAttributes,
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn repeated_incoming_id_is_counted_once() {
        let mut snapshot = Snapshot::default();
        let batch = diff_against(
            &mut snapshot,
            vec![record("1", 1.0, "a"), record("1", 9.0, "z")],
            ComparisonMode::GeometryOnly,
        );
        assert_eq!(batch.adds.len(), 1);
        assert!(batch.updates.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
