//! Exchanging a refresh token for new credentials

use crate::client::{ApiRequest, ClientError, transport::Transport};
use crate::types::{RefreshRequest, TokenResponse};
use async_trait::async_trait;

/// Obtains new tokens from a refresh token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError>;
}

/// Calls the refresh endpoint directly on the transport.
///
/// Bypassing the middleware chain keeps a rejected refresh from being
/// intercepted and retried itself.
pub struct HttpRefresher {
    transport: Transport,
    path: String,
}

impl HttpRefresher {
    pub fn new(transport: Transport, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        let request = ApiRequest::post(self.path.as_str())
            .without_auth_retry()
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })?;
        self.transport.send(request).await?.json()
    }
}
