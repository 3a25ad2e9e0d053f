//! Middleware stages applied to every request issued by a client
//!
//! A client owns an ordered list of stages. Each stage receives the request and
//! a [`Next`] handle to the rest of the chain; the transport sits at the end.
//! The default order is cache lookup, 401 retry, then credential attachment, so
//! a cache hit never touches the session and a retry re-reads the credential.

pub mod cache;
pub mod credential;
pub mod retry;

pub use cache::CacheLookup;
pub use credential::AttachCredential;
pub use retry::RetryOnUnauthorized;

use crate::client::{ApiRequest, ApiResponse, ClientError, transport::Transport};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// One named step of request processing
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in logs and for introspection
    fn name(&self) -> &'static str;

    /// Handle the request, usually by delegating to `next` at some point
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ClientError>;
}

/// The remainder of a chain. Cheap to copy, so a stage may run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    transport: &'a Transport,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Arc<dyn Stage>], transport: &'a Transport) -> Self {
        Self { stages, transport }
    }

    /// Pass the request to the next stage, or send it when none are left
    pub fn run(self, request: ApiRequest) -> BoxFuture<'a, Result<ApiResponse, ClientError>> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(request, Next::new(rest, self.transport)),
            None => Box::pin(self.transport.send(request)),
        }
    }
}

/// Ordered set of stages in front of a transport
#[derive(Clone)]
pub struct Chain {
    stages: Vec<Arc<dyn Stage>>,
    transport: Transport,
}

impl Chain {
    pub fn new(transport: Transport) -> Self {
        Self {
            stages: Vec::new(),
            transport,
        }
    }

    /// Append a stage; stages run in the order they are added
    pub fn with(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn with_arc(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn run(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        Next::new(&self.stages, &self.transport).run(request).await
    }
}
