//! Hosted feature service protocol.
//!
//! Every call is a form-encoded POST with `f=json`; responses are JSON.
//! [`FeatureService`] is the seam between the workers and the network so the
//! cycle can be driven against a scripted service in tests.

use std::fmt;
use std::time::Duration;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;

use layersync_core::{types::join_endpoint, Capability, Credentials};
use layersync_sync::EditPayload;

use crate::error::DaemonError;

const NOT_EDITABLE_MARKER: &str = "operation is not supported";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// `error` object returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Vec<String>,
}

impl RemoteError {
    /// The layer's capability change has not propagated yet.
    pub fn is_not_yet_editable(&self) -> bool {
        self.details
            .iter()
            .chain(std::iter::once(&self.message))
            .any(|text| text.to_ascii_lowercase().contains(NOT_EDITABLE_MARKER))
    }

    pub fn summary(&self) -> String {
        let mut summary = if self.message.is_empty() {
            "unknown error".to_string()
        } else {
            self.message.clone()
        };
        if !self.details.is_empty() {
            summary.push_str("; ");
            summary.push_str(&self.details.join(", "));
        }
        summary
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.summary()),
            None => f.write_str(&self.summary()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    /// Absolute expiry, epoch milliseconds.
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminResponse {
    #[serde(default, deserialize_with = "flag")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Per-record failure inside an edit result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct EditFailure {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub global_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<EditFailure>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub add_results: Vec<EditOutcome>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub update_results: Vec<EditOutcome>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delete_results: Vec<EditOutcome>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Explicit `null` reads the same as an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// `success` arrives as `true` or as `"true"` depending on the endpoint.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Flag::Bool(value)) => Ok(value),
        Some(Flag::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid success flag '{other}'"))),
        },
    }
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// Where and as whom tokens are requested.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: String,
    pub referer: String,
    pub credentials: Credentials,
}

pub trait FeatureService: Send + Sync {
    fn generate_token(
        &self,
        endpoint: &TokenEndpoint,
        expiration_minutes: u32,
    ) -> Result<TokenResponse, DaemonError>;

    /// `updateDefinition` on an admin endpoint.
    fn update_definition(
        &self,
        admin_url: &str,
        capability: Capability,
        token: &str,
    ) -> Result<AdminResponse, DaemonError>;

    /// `applyEdits` with `rollbackOnFailure=true`.
    fn apply_edits(
        &self,
        layer_url: &str,
        payload: &EditPayload,
        token: &str,
    ) -> Result<EditResults, DaemonError>;

    /// `deleteFeatures` with `rollbackOnFailure=false`.
    fn delete_features(
        &self,
        layer_url: &str,
        where_clause: &str,
        token: &str,
    ) -> Result<EditResults, DaemonError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking ArcGIS REST client.
pub struct ArcGisClient {
    agent: ureq::Agent,
}

impl ArcGisClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn post<T: DeserializeOwned>(&self, url: &str, form: &[(&str, &str)]) -> Result<T, DaemonError> {
        let mut fields = Vec::with_capacity(form.len() + 1);
        fields.push(("f", "json"));
        fields.extend_from_slice(form);

        let response = self
            .agent
            .post(url)
            .send_form(&fields)
            .map_err(|err| DaemonError::Http {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        response
            .into_json::<T>()
            .map_err(|err| DaemonError::MalformedResponse {
                url: url.to_string(),
                detail: err.to_string(),
            })
    }
}

impl FeatureService for ArcGisClient {
    fn generate_token(
        &self,
        endpoint: &TokenEndpoint,
        expiration_minutes: u32,
    ) -> Result<TokenResponse, DaemonError> {
        let expiration = expiration_minutes.to_string();
        self.post(
            &endpoint.url,
            &[
                ("username", endpoint.credentials.username.as_str()),
                ("password", endpoint.credentials.password.as_str()),
                ("expiration", expiration.as_str()),
                ("referer", endpoint.referer.as_str()),
            ],
        )
    }

    fn update_definition(
        &self,
        admin_url: &str,
        capability: Capability,
        token: &str,
    ) -> Result<AdminResponse, DaemonError> {
        let definition =
            serde_json::json!({ "capabilities": capability.remote_capabilities() }).to_string();
        self.post(
            &join_endpoint(admin_url, "updateDefinition"),
            &[
                ("updateDefinition", definition.as_str()),
                ("async", "false"),
                ("token", token),
            ],
        )
    }

    fn apply_edits(
        &self,
        layer_url: &str,
        payload: &EditPayload,
        token: &str,
    ) -> Result<EditResults, DaemonError> {
        self.post(
            &join_endpoint(layer_url, "applyEdits"),
            &[
                ("adds", payload.adds.as_str()),
                ("updates", payload.updates.as_str()),
                ("deletes", payload.deletes.as_str()),
                ("rollbackOnFailure", "true"),
                ("token", token),
            ],
        )
    }

    fn delete_features(
        &self,
        layer_url: &str,
        where_clause: &str,
        token: &str,
    ) -> Result<EditResults, DaemonError> {
        self.post(
            &join_endpoint(layer_url, "deleteFeatures"),
            &[
                ("where", where_clause),
                ("rollbackOnFailure", "false"),
                ("token", token),
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_editable_is_detected_in_details_case_insensitively() {
        let error: RemoteError = serde_json::from_str(
            r#"{"code":400,"message":"Unable to complete operation.",
                "details":["This Operation is not supported on this layer."]}"#,
        )
        .unwrap();
        assert!(error.is_not_yet_editable());

        let other = RemoteError {
            code: Some(498),
            message: "Invalid token.".into(),
            details: vec![],
        };
        assert!(!other.is_not_yet_editable());
    }

    #[test]
    fn remote_error_display_includes_details_and_code() {
        let error = RemoteError {
            code: Some(400),
            message: "Unable to complete operation.".into(),
            details: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            error.to_string(),
            "Unable to complete operation.; a, b (code 400)"
        );
    }

    #[test]
    fn success_flag_accepts_bool_or_string() {
        let results: EditResults = serde_json::from_str(
            r#"{"addResults":[
                    {"objectId":1,"globalId":"{g1}","success":true},
                    {"objectId":2,"success":"true"},
                    {"success":"false","error":{"code":1000,"description":"bad geometry"}}
                ]}"#,
        )
        .unwrap();
        let flags: Vec<_> = results.add_results.iter().map(|r| r.success).collect();
        assert_eq!(flags, [true, true, false]);
        assert_eq!(results.add_results[0].global_id.as_deref(), Some("{g1}"));
        assert_eq!(
            results.add_results[2].error.as_ref().map(|e| e.description.as_str()),
            Some("bad geometry")
        );
        assert!(results.update_results.is_empty());
    }

    #[test]
    fn null_error_fields_still_classify_the_failure() {
        let results: EditResults = serde_json::from_str(
            r#"{"error":{"code":400,"message":"Unable to complete operation.","details":null}}"#,
        )
        .unwrap();
        let error = results.error.expect("error payload");
        assert!(error.details.is_empty());
        assert_eq!(error.to_string(), "Unable to complete operation. (code 400)");
        assert!(!error.is_not_yet_editable());

        let retryable: EditResults = serde_json::from_str(
            r#"{"addResults":null,"error":{"message":"Operation is not supported.","details":null}}"#,
        )
        .unwrap();
        assert!(retryable.add_results.is_empty());
        assert!(retryable.error.expect("error payload").is_not_yet_editable());

        let outcome: EditOutcome = serde_json::from_str(
            r#"{"success":false,"error":{"code":1000,"description":null}}"#,
        )
        .unwrap();
        assert_eq!(outcome.error.map(|e| e.description), Some(String::new()));

        let message_null: RemoteError =
            serde_json::from_str(r#"{"code":498,"message":null,"details":[]}"#).unwrap();
        assert_eq!(message_null.to_string(), "unknown error (code 498)");
    }

    #[test]
    fn missing_success_is_false() {
        let admin: AdminResponse =
            serde_json::from_str(r#"{"error":{"message":"denied"}}"#).unwrap();
        assert!(!admin.success);
        assert_eq!(admin.error.unwrap().message, "denied");
    }

    #[test]
    fn token_response_reads_expiry() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"token":"abc","expires":1700000000000,"ssl":true}"#).unwrap();
        assert_eq!(token.token.as_deref(), Some("abc"));
        assert_eq!(token.expires, Some(1_700_000_000_000));
        assert!(token.error.is_none());
    }
}
