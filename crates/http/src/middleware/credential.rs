//! Attaches the stored access token to outgoing requests

use super::{Next, Stage};
use crate::client::{ApiRequest, ApiResponse, ClientError};
use crate::session::SessionManager;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AttachCredential {
    session: Arc<SessionManager>,
}

impl AttachCredential {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Stage for AttachCredential {
    fn name(&self) -> &'static str {
        "attach-credential"
    }

    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, ClientError> {
        // Re-read on every pass so a retried request carries the renewed token
        request.clear_bearer();
        self.session.attach_credential(&mut request).await?;
        next.run(request).await
    }
}
