//! Worker status board served over the control socket.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use layersync_core::{Capability, ComparisonMode, LayerName};

/// Where a layer worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    #[default]
    Idle,
    RequestingToken,
    EnablingEdit,
    Clearing,
    Loading,
    ApplyingEdits,
    DisablingEdit,
    Sleeping,
    Terminated,
}

impl WorkerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::RequestingToken => "requesting_token",
            WorkerPhase::EnablingEdit => "enabling_edit",
            WorkerPhase::Clearing => "clearing",
            WorkerPhase::Loading => "loading",
            WorkerPhase::ApplyingEdits => "applying_edits",
            WorkerPhase::DisablingEdit => "disabling_edit",
            WorkerPhase::Sleeping => "sleeping",
            WorkerPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub layer: LayerName,
    pub comparison_mode: ComparisonMode,
    pub shared_admin: bool,
    pub phase: WorkerPhase,
    pub capability: Capability,
    pub cycles: u64,
    pub snapshot_size: Option<usize>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LayerStatus {
    pub fn new(layer: LayerName, comparison_mode: ComparisonMode, shared_admin: bool) -> Self {
        Self {
            layer,
            comparison_mode,
            shared_admin,
            phase: WorkerPhase::Idle,
            capability: Capability::ReadOnly,
            cycles: 0,
            snapshot_size: None,
            last_cycle_at: None,
            last_error: None,
        }
    }
}

/// Payload of the `status` control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub active_workers: usize,
    pub token_expires_at_ms: Option<i64>,
    pub layers: Vec<LayerStatus>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    layers: RwLock<BTreeMap<LayerName, LayerStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, status: LayerStatus) {
        self.layers.write().insert(status.layer.clone(), status);
    }

    pub fn update(&self, layer: &LayerName, apply: impl FnOnce(&mut LayerStatus)) {
        if let Some(status) = self.layers.write().get_mut(layer) {
            apply(status);
        }
    }

    pub fn set_phase(&self, layer: &LayerName, phase: WorkerPhase) {
        self.update(layer, |status| status.phase = phase);
    }

    pub fn get(&self, layer: &LayerName) -> Option<LayerStatus> {
        self.layers.read().get(layer).cloned()
    }

    pub fn layers(&self) -> Vec<LayerStatus> {
        self.layers.read().values().cloned().collect()
    }

    pub fn report(
        &self,
        started_at: DateTime<Utc>,
        active_workers: usize,
        token_expires_at_ms: Option<i64>,
    ) -> StatusReport {
        StatusReport {
            running: true,
            started_at,
            active_workers,
            token_expires_at_ms,
            layers: self.layers(),
        }
    }
}
