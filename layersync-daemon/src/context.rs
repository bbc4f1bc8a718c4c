use std::sync::Arc;
use std::time::Duration;

use layersync_sync::RowSource;

use crate::capability::EditorRegistry;
use crate::remote::{FeatureService, TokenEndpoint};
use crate::status::StatusBoard;
use crate::token::TokenCache;

/// State shared by every layer worker of one runtime.
pub struct SharedContext {
    pub service: Arc<dyn FeatureService>,
    pub source: Arc<dyn RowSource>,
    pub token_endpoint: TokenEndpoint,
    pub tokens: TokenCache,
    pub editors: Arc<EditorRegistry>,
    pub board: Arc<StatusBoard>,
    pub retry_delay: Duration,
}

impl SharedContext {
    pub fn new(
        service: Arc<dyn FeatureService>,
        source: Arc<dyn RowSource>,
        token_endpoint: TokenEndpoint,
        retry_delay: Duration,
    ) -> Self {
        Self {
            service,
            source,
            token_endpoint,
            tokens: TokenCache::new(),
            editors: Arc::new(EditorRegistry::new()),
            board: Arc::new(StatusBoard::new()),
            retry_delay,
        }
    }

    pub fn ensure_token(&self) -> Result<String, crate::DaemonError> {
        self.tokens
            .ensure_valid(self.service.as_ref(), &self.token_endpoint)
    }
}
