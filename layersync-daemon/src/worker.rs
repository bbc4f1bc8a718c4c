//! One layer's poll → enable → diff → edit → disable cycle.
//!
//! A cycle is fully blocking; the runtime runs it on the blocking pool and
//! owns the sleep between cycles. The stop flag is honoured between phases,
//! never in the middle of a remote call or query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use layersync_core::{Capability, LayerConfig, LayerName};
use layersync_sync::{poll_layer, FeatureEncoder, Snapshot};

use crate::capability::{CapabilityController, WorkerId};
use crate::context::SharedContext;
use crate::error::DaemonError;
use crate::status::{LayerStatus, WorkerPhase};
use crate::submit::{EditSubmitter, EditSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(EditSummary),
    /// The stop flag was observed; editing was disabled again if it had been
    /// enabled.
    Stopped,
}

pub struct LayerWorker {
    layer: LayerConfig,
    id: WorkerId,
    registered: bool,
    ctx: Arc<SharedContext>,
    snapshot: Option<Snapshot>,
    capability: CapabilityController,
    submitter: EditSubmitter,
    cycles: u64,
}

impl LayerWorker {
    /// Register with the editor registry and the status board.
    pub fn new(layer: LayerConfig, shared_admin: bool, ctx: Arc<SharedContext>) -> Self {
        let id = ctx.editors.register(&layer, shared_admin);
        ctx.board.insert(LayerStatus::new(
            layer.name.clone(),
            layer.comparison_mode,
            shared_admin,
        ));
        let capability =
            CapabilityController::new(id, &layer, shared_admin, Arc::clone(&ctx.editors));
        let submitter = EditSubmitter::new(&layer, ctx.retry_delay);
        Self {
            layer,
            id,
            registered: true,
            ctx,
            snapshot: None,
            capability,
            submitter,
            cycles: 0,
        }
    }

    pub fn name(&self) -> &LayerName {
        &self.layer.name
    }

    pub fn poll_interval(&self) -> Duration {
        self.layer.poll_interval()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        self.ctx.board.set_phase(&self.layer.name, phase);
    }

    pub fn run_cycle(&mut self, stop: &AtomicBool) -> Result<CycleOutcome, DaemonError> {
        tracing::info!(layer = %self.layer.name, "start updating");

        self.set_phase(WorkerPhase::RequestingToken);
        let token = self.ctx.ensure_token()?;
        if stop.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Stopped);
        }

        self.set_phase(WorkerPhase::EnablingEdit);
        let service = Arc::clone(&self.ctx.service);
        self.capability
            .set_capability(Capability::Editable, service.as_ref(), &token)?;
        self.publish_capability();

        let edited = self.edit(&token, stop);

        self.set_phase(WorkerPhase::DisablingEdit);
        let disabled = self
            .capability
            .set_capability(Capability::ReadOnly, service.as_ref(), &token);
        self.publish_capability();

        let outcome = match (edited, disabled) {
            (Err(err), Err(disable_err)) => {
                tracing::error!(
                    layer = %self.layer.name,
                    error = %disable_err,
                    "disabling editing after a failed cycle also failed"
                );
                Err(err)
            }
            (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
            (Ok(outcome), Ok(_)) => Ok(outcome),
        };

        if let Ok(CycleOutcome::Completed(_)) = &outcome {
            self.cycles += 1;
            let cycles = self.cycles;
            let snapshot_size = self.snapshot.as_ref().map(Snapshot::len);
            self.ctx.board.update(&self.layer.name, |status| {
                status.cycles = cycles;
                status.snapshot_size = snapshot_size;
                status.last_cycle_at = Some(Utc::now());
                status.last_error = None;
            });
        }
        outcome
    }

    /// Clearing (first seed only) → Loading → ApplyingEdits.
    fn edit(&mut self, token: &str, stop: &AtomicBool) -> Result<CycleOutcome, DaemonError> {
        let ctx = Arc::clone(&self.ctx);
        let service = ctx.service.as_ref();

        if self.snapshot.is_none() && self.layer.clear_before_seed {
            self.set_phase(WorkerPhase::Clearing);
            self.submitter
                .clear_layer(service, &mut self.capability, token)?;
        }
        if stop.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Stopped);
        }

        self.set_phase(WorkerPhase::Loading);
        let mut batch = poll_layer(ctx.source.as_ref(), &self.layer, &mut self.snapshot)?;
        if stop.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Stopped);
        }

        self.set_phase(WorkerPhase::ApplyingEdits);
        let encoder = FeatureEncoder::new(&self.layer);
        let snapshot = self.snapshot.get_or_insert_with(Snapshot::default);
        let summary = self.submitter.submit(
            &mut batch,
            snapshot,
            &encoder,
            service,
            &mut self.capability,
            token,
        )?;
        Ok(CycleOutcome::Completed(summary))
    }

    /// Log `err`, leave coordination and return the number of workers still
    /// registered.
    pub fn fail(&mut self, err: &DaemonError) -> usize {
        tracing::error!(layer = %self.layer.name, error = %err, "layer update failed");
        let message = err.to_string();
        self.ctx.board.update(&self.layer.name, |status| {
            status.last_error = Some(message);
        });
        let remaining = self.terminate();
        tracing::warn!(
            layer = %self.layer.name,
            remaining,
            "{} updating worker is aborting. Left living workers: {remaining}",
            self.layer.name
        );
        remaining
    }

    /// Cooperative stop; returns the number of workers still registered.
    pub fn stop(&mut self) -> usize {
        let remaining = self.terminate();
        tracing::info!(layer = %self.layer.name, remaining, "layer worker stopped");
        remaining
    }

    fn terminate(&mut self) -> usize {
        self.set_phase(WorkerPhase::Terminated);
        if self.registered {
            self.registered = false;
            self.ctx.editors.deregister(self.id)
        } else {
            self.ctx.editors.active()
        }
    }

    fn publish_capability(&self) {
        let capability = self.capability.state();
        self.ctx
            .board
            .update(&self.layer.name, |status| status.capability = capability);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
