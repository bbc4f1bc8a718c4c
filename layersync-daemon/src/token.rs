//! Process-wide token cache.
//!
//! One credential serves every worker. It is checked and, when close to
//! expiry, replaced under a single lock held across the remote call, so
//! concurrent workers never request more than one token at a time.

use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::DaemonError;
use crate::remote::{FeatureService, TokenEndpoint};

/// Remaining lifetime at or below which the token is refreshed.
pub const REFRESH_MARGIN_MS: i64 = 300_000;

/// Lifetime requested for new tokens.
pub const TOKEN_EXPIRATION_MINUTES: u32 = 1440;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    /// Epoch milliseconds.
    pub expires_at_ms: i64,
}

impl Credential {
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at_ms - now_ms
    }

    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.remaining_ms(now_ms) > REFRESH_MARGIN_MS
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TokenCache {
    current: Mutex<Option<Credential>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, refreshed first if it is missing or within
    /// [`REFRESH_MARGIN_MS`] of expiring.
    pub fn ensure_valid(
        &self,
        service: &dyn FeatureService,
        endpoint: &TokenEndpoint,
    ) -> Result<String, DaemonError> {
        self.ensure_valid_at(service, endpoint, Utc::now().timestamp_millis())
    }

    pub fn ensure_valid_at(
        &self,
        service: &dyn FeatureService,
        endpoint: &TokenEndpoint,
        now_ms: i64,
    ) -> Result<String, DaemonError> {
        let mut current = self.current.lock();
        if let Some(credential) = current.as_ref() {
            if credential.is_fresh(now_ms) {
                return Ok(credential.token.clone());
            }
        }

        let response = service.generate_token(endpoint, TOKEN_EXPIRATION_MINUTES)?;
        if let Some(error) = response.error {
            return Err(DaemonError::Token(error.to_string()));
        }
        let credential = match (response.token, response.expires) {
            (Some(token), Some(expires)) if !token.is_empty() && expires >= 0 => Credential {
                token,
                expires_at_ms: expires,
            },
            _ => {
                return Err(DaemonError::Token(
                    "response carried no token or expiry".to_string(),
                ))
            }
        };

        tracing::info!(
            user = %endpoint.credentials.username,
            expires_at_ms = credential.expires_at_ms,
            "generated access token"
        );
        let token = credential.token.clone();
        *current = Some(credential);
        Ok(token)
    }

    /// Expiry of the cached token, if any.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.current.lock().as_ref().map(|c| c.expires_at_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
