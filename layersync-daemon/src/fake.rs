//! Scripted stand-ins for the remote service and the row source.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use layersync_core::{Capability, Credentials, Fields};
use layersync_sync::{EditPayload, RowSource, SyncError};

use crate::error::DaemonError;
use crate::remote::{
    AdminResponse, EditOutcome, EditResults, FeatureService, TokenEndpoint, TokenResponse,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Token,
    UpdateDefinition {
        admin_url: String,
        capability: Capability,
    },
    ApplyEdits {
        layer_url: String,
        payload: EditPayload,
    },
    DeleteFeatures {
        layer_url: String,
        where_clause: String,
    },
}

/// Replays queued responses; once a queue is drained every call succeeds.
#[derive(Default)]
pub struct ScriptedService {
    tokens: Mutex<VecDeque<Result<TokenResponse, DaemonError>>>,
    admin: Mutex<VecDeque<Result<AdminResponse, DaemonError>>>,
    edits: Mutex<VecDeque<Result<EditResults, DaemonError>>>,
    clears: Mutex<VecDeque<Result<EditResults, DaemonError>>>,
    calls: Mutex<Vec<Call>>,
    remote_capability: Mutex<HashMap<String, Capability>>,
    next_object_id: Mutex<i64>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint() -> TokenEndpoint {
        TokenEndpoint {
            url: "https://auth.test/generateToken".into(),
            referer: "http://127.0.0.1".into(),
            credentials: Credentials {
                username: "editor".into(),
                password: "secret".into(),
            },
        }
    }

    pub fn push_token(&self, response: Result<TokenResponse, DaemonError>) {
        self.tokens.lock().push_back(response);
    }

    pub fn push_admin(&self, response: Result<AdminResponse, DaemonError>) {
        self.admin.lock().push_back(response);
    }

    pub fn push_edits(&self, response: Result<EditResults, DaemonError>) {
        self.edits.lock().push_back(response);
    }

    pub fn push_clear(&self, response: Result<EditResults, DaemonError>) {
        self.clears.lock().push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn token_requests(&self) -> usize {
        self.count(|call| matches!(call, Call::Token))
    }

    pub fn definition_updates(&self) -> Vec<Capability> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::UpdateDefinition { capability, .. } => Some(*capability),
                _ => None,
            })
            .collect()
    }

    pub fn edit_payloads(&self) -> Vec<EditPayload> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::ApplyEdits { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) -> usize {
        self.count(|call| matches!(call, Call::DeleteFeatures { .. }))
    }

    /// Capability last applied to `admin_url` by a successful definition
    /// update.
    pub fn remote_capability(&self, admin_url: &str) -> Capability {
        self.remote_capability
            .lock()
            .get(admin_url)
            .copied()
            .unwrap_or_default()
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn succeed_all(&self, payload: &EditPayload) -> EditResults {
        let mut next = self.next_object_id.lock();
        let outcome = |object_id: Option<i64>| EditOutcome {
            object_id,
            global_id: object_id.map(|id| format!("{{g-{id}}}")),
            success: true,
            error: None,
        };
        let adds = feature_count(&payload.adds);
        let updates = feature_count(&payload.updates);
        let deletes: Vec<i64> = payload
            .deletes
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();

        EditResults {
            add_results: (0..adds)
                .map(|_| {
                    *next += 1;
                    outcome(Some(*next))
                })
                .collect(),
            update_results: (0..updates).map(|_| outcome(None)).collect(),
            delete_results: deletes.into_iter().map(|id| outcome(Some(id))).collect(),
            error: None,
        }
    }
}

fn feature_count(encoded: &str) -> usize {
    if encoded.is_empty() {
        return 0;
    }
    serde_json::from_str::<Vec<serde_json::Value>>(encoded)
        .map(|features| features.len())
        .unwrap_or(0)
}

impl FeatureService for ScriptedService {
    fn generate_token(
        &self,
        _endpoint: &TokenEndpoint,
        _expiration_minutes: u32,
    ) -> Result<TokenResponse, DaemonError> {
        self.record(Call::Token);
        self.tokens.lock().pop_front().unwrap_or_else(|| {
            Ok(TokenResponse {
                token: Some("scripted-token".into()),
                expires: Some(i64::MAX / 2),
                error: None,
            })
        })
    }

    fn update_definition(
        &self,
        admin_url: &str,
        capability: Capability,
        _token: &str,
    ) -> Result<AdminResponse, DaemonError> {
        self.record(Call::UpdateDefinition {
            admin_url: admin_url.to_string(),
            capability,
        });
        let response = self.admin.lock().pop_front().unwrap_or_else(|| {
            Ok(AdminResponse {
                success: true,
                error: None,
            })
        });
        if matches!(response, Ok(AdminResponse { success: true, .. })) {
            self.remote_capability
                .lock()
                .insert(admin_url.to_string(), capability);
        }
        response
    }

    fn apply_edits(
        &self,
        layer_url: &str,
        payload: &EditPayload,
        _token: &str,
    ) -> Result<EditResults, DaemonError> {
        self.record(Call::ApplyEdits {
            layer_url: layer_url.to_string(),
            payload: payload.clone(),
        });
        let scripted = self.edits.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.succeed_all(payload)))
    }

    fn delete_features(
        &self,
        layer_url: &str,
        where_clause: &str,
        _token: &str,
    ) -> Result<EditResults, DaemonError> {
        self.record(Call::DeleteFeatures {
            layer_url: layer_url.to_string(),
            where_clause: where_clause.to_string(),
        });
        let scripted = self.clears.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(EditResults::default()))
    }
}

/// Row source returning queued result sets, then repeating the last one.
#[derive(Default)]
pub struct ScriptedSource {
    queued: Mutex<VecDeque<Result<Vec<Fields>, String>>>,
    last: Mutex<Vec<Fields>>,
    fetches: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(rows: Vec<Fields>) -> Self {
        let source = Self::default();
        *source.last.lock() = rows;
        source
    }

    pub fn push_rows(&self, rows: Vec<Fields>) {
        self.queued.lock().push_back(Ok(rows));
    }

    pub fn push_failure(&self, column: &str) {
        self.queued.lock().push_back(Err(column.to_string()));
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }
}

impl RowSource for ScriptedSource {
    fn fetch(&self, _query: &str) -> Result<Vec<Fields>, SyncError> {
        *self.fetches.lock() += 1;
        let next = self.queued.lock().pop_front();
        match next {
            Some(Ok(rows)) => {
                *self.last.lock() = rows.clone();
                Ok(rows)
            }
            Some(Err(column)) => Err(SyncError::UnsupportedColumn { column }),
            None => Ok(self.last.lock().clone()),
        }
    }
}
