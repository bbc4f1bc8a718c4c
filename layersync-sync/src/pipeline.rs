//! Poll pipeline shared by the daemon workers and the CLI.

use layersync_core::{EditBatch, FeatureRecord, LayerConfig};

use crate::{detector, records, snapshot::Snapshot, source::RowSource, SyncError};

/// Query the layer's rows and shape them into records.
pub fn load_records(
    source: &dyn RowSource,
    layer: &LayerConfig,
) -> Result<Vec<FeatureRecord>, SyncError> {
    let rows = source.fetch(&layer.query)?;
    records::to_records(rows, layer.comparison_mode)
}

/// One poll: query, then diff against `snapshot`.
///
/// On error the snapshot is left untouched.
pub fn poll_layer(
    source: &dyn RowSource,
    layer: &LayerConfig,
    snapshot: &mut Option<Snapshot>,
) -> Result<EditBatch, SyncError> {
    let incoming = load_records(source, layer)?;
    let seeding = snapshot.is_none();
    let batch = detector::detect_changes(snapshot, incoming, layer.comparison_mode);
    tracing::debug!(
        layer = %layer.name,
        seeding,
        adds = batch.adds.len(),
        updates = batch.updates.len(),
        deletes = batch.deletes.len(),
        "poll diffed"
    );
    Ok(batch)
}
