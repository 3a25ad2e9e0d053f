//! Renews the session and replays a request rejected with 401

use super::{Next, Stage};
use crate::client::{ApiRequest, ApiResponse, ClientError};
use crate::session::SessionManager;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// On 401, refresh the access token once and send the request again.
///
/// A request is replayed at most once. If the refresh fails the session is
/// cleared and the caller sees the original 401. A 401 on the replay is
/// returned as-is.
pub struct RetryOnUnauthorized {
    session: Arc<SessionManager>,
}

impl RetryOnUnauthorized {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Stage for RetryOnUnauthorized {
    fn name(&self) -> &'static str {
        "retry-on-401"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ClientError> {
        if !request.allows_auth_retry() {
            return next.run(request).await;
        }

        let seen = self.session.access_token().await?;
        let mut replay = request.clone();

        let err = match next.run(request).await {
            Err(err) if err.is_unauthorized() => err,
            other => return other,
        };

        debug!(path = replay.path(), "request unauthorized, renewing session");
        if let Err(refresh_err) = self.session.refresh_after(seen.as_deref()).await {
            info!(error = %refresh_err, "session could not be renewed");
            return Err(err);
        }

        replay.mark_retried();
        next.run(replay).await
    }
}
