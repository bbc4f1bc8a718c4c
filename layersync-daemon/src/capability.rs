//! Capability toggling and cross-worker editor coordination.
//!
//! Layers whose admin URL is shared flip capabilities under one runtime-wide
//! lock and consult the [`EditorRegistry`] before disabling, so one worker
//! never turns editing off underneath a sibling that is still writing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use layersync_core::{Capability, LayerConfig, LayerName};

use crate::error::DaemonError;
use crate::remote::{FeatureService, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct EditorEntry {
    layer: LayerName,
    admin_url: String,
    shared: bool,
    /// Last state this worker asked for; drives disable suppression.
    requested: Capability,
}

/// Who is registered, on which admin endpoint, and in what state.
#[derive(Debug, Default)]
pub struct EditorRegistry {
    entries: Mutex<HashMap<WorkerId, EditorEntry>>,
    next_id: AtomicUsize,
    toggle_lock: Arc<Mutex<()>>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, layer: &LayerConfig, shared: bool) -> WorkerId {
        let id = WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().insert(
            id,
            EditorEntry {
                layer: layer.name.clone(),
                admin_url: layer.admin_url.clone(),
                shared,
                requested: Capability::ReadOnly,
            },
        );
        id
    }

    /// Remove `id`; returns how many workers remain registered.
    pub fn deregister(&self, id: WorkerId) -> usize {
        let mut entries = self.entries.lock();
        entries.remove(&id);
        entries.len()
    }

    pub fn active(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn set_requested(&self, id: WorkerId, capability: Capability) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.requested = capability;
        }
    }

    pub fn requested(&self, id: WorkerId) -> Option<Capability> {
        self.entries.lock().get(&id).map(|entry| entry.requested)
    }

    /// Another worker on the same shared admin endpoint whose last request
    /// was `Editable`, if any.
    pub fn editing_sibling(&self, id: WorkerId) -> Option<LayerName> {
        let entries = self.entries.lock();
        let me = entries.get(&id)?;
        entries
            .iter()
            .filter(|(other_id, _)| **other_id != id)
            .map(|(_, other)| other)
            .find(|other| {
                other.shared
                    && other.requested.is_editable()
                    && other.admin_url.eq_ignore_ascii_case(&me.admin_url)
            })
            .map(|other| other.layer.clone())
    }

    /// Lock serializing capability changes on shared admin endpoints.
    pub fn toggle_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.toggle_lock)
    }
}

/// Result of a capability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityChange {
    /// The remote definition was updated.
    Applied,
    /// Disable skipped because a sibling on the shared endpoint is editing.
    HeldBySibling,
}

/// Per-worker capability state machine.
#[derive(Debug)]
pub struct CapabilityController {
    worker: WorkerId,
    layer: LayerName,
    admin_url: String,
    shared: bool,
    state: Capability,
    local_lock: Arc<Mutex<()>>,
    registry: Arc<EditorRegistry>,
}

impl CapabilityController {
    pub fn new(
        worker: WorkerId,
        layer: &LayerConfig,
        shared: bool,
        registry: Arc<EditorRegistry>,
    ) -> Self {
        Self {
            worker,
            layer: layer.name.clone(),
            admin_url: layer.admin_url.clone(),
            shared,
            state: Capability::ReadOnly,
            local_lock: Arc::new(Mutex::new(())),
            registry,
        }
    }

    pub fn state(&self) -> Capability {
        self.state
    }

    pub fn set_capability(
        &mut self,
        target: Capability,
        service: &dyn FeatureService,
        token: &str,
    ) -> Result<CapabilityChange, DaemonError> {
        let lock = if self.shared {
            self.registry.toggle_lock()
        } else {
            Arc::clone(&self.local_lock)
        };
        let _guard = lock.lock();

        self.registry.set_requested(self.worker, target);
        if self.shared && !target.is_editable() {
            if let Some(sibling) = self.registry.editing_sibling(self.worker) {
                tracing::info!(
                    layer = %self.layer,
                    sibling = %sibling,
                    "shared service still being edited by another layer; leaving it editable"
                );
                self.state = target;
                return Ok(CapabilityChange::HeldBySibling);
            }
        }

        let outcome = service
            .update_definition(&self.admin_url, target, token)
            .and_then(|response| {
                if response.success {
                    Ok(())
                } else {
                    Err(DaemonError::Remote {
                        layer: self.layer.clone(),
                        operation: "updateDefinition",
                        error: response.error.unwrap_or_else(|| RemoteError {
                            message: "Unknown error".to_string(),
                            ..RemoteError::default()
                        }),
                    })
                }
            });

        match outcome {
            Ok(()) => {
                self.state = target;
                tracing::info!(
                    layer = %self.layer,
                    capabilities = target.remote_capabilities(),
                    "updated feature layer definition"
                );
                Ok(CapabilityChange::Applied)
            }
            Err(err) => {
                self.registry.set_requested(self.worker, Capability::ReadOnly);
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
