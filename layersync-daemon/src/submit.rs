//! Edit submission with bounded "not yet editable" retries.
//!
//! The retry counter resets after every submission that succeeds or fails
//! fatally, so the bound applies to one `applyEdits` or `deleteFeatures`
//! exchange rather than accumulating over the worker's lifetime.

use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use layersync_core::{Capability, EditBatch, LayerConfig, LayerName};
use layersync_sync::{EditKind, FeatureEncoder, Snapshot};

use crate::capability::CapabilityController;
use crate::error::DaemonError;
use crate::remote::{EditOutcome, EditResults, FeatureService};

/// Retries allowed per submission when the layer reports it is not yet
/// editable; the next occurrence is fatal.
pub const MAX_NOT_EDITABLE_RETRIES: u32 = 4;

const CLEAR_ALL: &str = "1=1";

/// Per-kind result counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTally {
    pub succeeded: usize,
    pub failed: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSummary {
    pub adds: KindTally,
    pub updates: KindTally,
    pub deletes: KindTally,
}

impl EditSummary {
    pub fn failed(&self) -> usize {
        self.adds.failed + self.updates.failed + self.deletes.failed
    }
}

#[derive(Debug)]
pub struct EditSubmitter {
    layer: LayerName,
    layer_url: String,
    retries: u32,
    retry_delay: Duration,
}

impl EditSubmitter {
    pub fn new(layer: &LayerConfig, retry_delay: Duration) -> Self {
        Self {
            layer: layer.name.clone(),
            layer_url: layer.layer_url.clone(),
            retries: 0,
            retry_delay,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Submit `batch` as one `applyEdits` call.
    ///
    /// Confirmed adds get their remote ids copied onto both the batch record
    /// and the matching snapshot record. Per-record failures are logged and
    /// counted, never returned as errors. An empty batch is not sent.
    pub fn submit(
        &mut self,
        batch: &mut EditBatch,
        snapshot: &mut Snapshot,
        encoder: &FeatureEncoder,
        service: &dyn FeatureService,
        capability: &mut CapabilityController,
        token: &str,
    ) -> Result<EditSummary, DaemonError> {
        let payload = encoder.encode(batch)?;
        if payload.adds.is_empty() && payload.updates.is_empty() && payload.deletes.is_empty() {
            tracing::debug!(layer = %self.layer, "no changes to submit");
            return Ok(EditSummary::default());
        }

        let layer_url = self.layer_url.clone();
        let results = self.send_with_retry("applyEdits", service, capability, token, || {
            service.apply_edits(&layer_url, &payload, token)
        })?;

        for (record, outcome) in batch.adds.iter_mut().zip(&results.add_results) {
            if outcome.success {
                record.object_id = outcome.object_id;
                record.global_id = outcome.global_id.clone();
                snapshot.assign_remote_ids(
                    &record.unique_id,
                    outcome.object_id,
                    outcome.global_id.clone(),
                );
            }
        }

        Ok(EditSummary {
            adds: self.tally(EditKind::Add, &results.add_results),
            updates: self.tally(EditKind::Update, &results.update_results),
            deletes: self.tally(EditKind::Delete, &results.delete_results),
        })
    }

    /// Delete every remote feature (`where=1=1`).
    pub fn clear_layer(
        &mut self,
        service: &dyn FeatureService,
        capability: &mut CapabilityController,
        token: &str,
    ) -> Result<KindTally, DaemonError> {
        let layer_url = self.layer_url.clone();
        let results = self.send_with_retry("deleteFeatures", service, capability, token, || {
            service.delete_features(&layer_url, CLEAR_ALL, token)
        })?;
        tracing::info!(layer = %self.layer, "cleared hosted feature layer");
        Ok(self.tally(EditKind::Delete, &results.delete_results))
    }

    fn send_with_retry(
        &mut self,
        operation: &'static str,
        service: &dyn FeatureService,
        capability: &mut CapabilityController,
        token: &str,
        send: impl Fn() -> Result<EditResults, DaemonError>,
    ) -> Result<EditResults, DaemonError> {
        loop {
            let mut results = match send() {
                Ok(results) => results,
                Err(err) => {
                    self.retries = 0;
                    return Err(err);
                }
            };

            let Some(error) = results.error.take() else {
                self.retries = 0;
                return Ok(results);
            };

            if !error.is_not_yet_editable() {
                self.retries = 0;
                return Err(DaemonError::Remote {
                    layer: self.layer.clone(),
                    operation,
                    error,
                });
            }
            if self.retries >= MAX_NOT_EDITABLE_RETRIES {
                let attempts = self.retries;
                self.retries = 0;
                return Err(DaemonError::RetriesExhausted {
                    layer: self.layer.clone(),
                    operation,
                    attempts,
                });
            }

            self.retries += 1;
            tracing::warn!(
                layer = %self.layer,
                operation,
                attempt = self.retries,
                max = MAX_NOT_EDITABLE_RETRIES,
                "layer not yet editable; re-enabling editing and retrying"
            );
            if !self.retry_delay.is_zero() {
                sleep(self.retry_delay);
            }
            if let Err(err) = capability.set_capability(Capability::Editable, service, token) {
                self.retries = 0;
                return Err(err);
            }
        }
    }

    fn tally(&self, kind: EditKind, outcomes: &[EditOutcome]) -> KindTally {
        let mut tally = KindTally::default();
        for outcome in outcomes {
            if outcome.success {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
                if let Some(error) = &outcome.error {
                    tally.last_error = Some(error.description.clone());
                }
            }
        }

        if !outcomes.is_empty() {
            tracing::info!(
                layer = %self.layer,
                "succeeded to {kind} {} {} feature(s)",
                tally.succeeded,
                self.layer
            );
        }
        if tally.failed > 0 {
            tracing::error!(
                layer = %self.layer,
                "failed to {kind} {} {} feature(s) - {}",
                tally.failed,
                self.layer,
                tally.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        tally
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
