//! Portal HTTP client

pub mod auth;
pub mod error;
pub mod request;
pub mod transport;

pub use error::ClientError;
pub use request::{ApiRequest, ApiResponse};

use crate::cache::ResponseCache;
use crate::middleware::{AttachCredential, CacheLookup, Chain, RetryOnUnauthorized, Stage};
use crate::session::{HttpRefresher, SessionManager, TokenRefresher};
use portal_core::{
    ClientSettings, Clock, EndpointSettings, KeyValueStore, MemoryStore, SessionKeys, SystemClock,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use transport::Transport;

/// Portal API client
///
/// Every request passes through the middleware chain: cache lookup, retry on
/// 401, credential attachment, then the transport. Clones share the session,
/// cache and connection pool.
#[derive(Clone)]
pub struct PortalClient {
    inner: Arc<Inner>,
}

struct Inner {
    chain: Chain,
    session: Arc<SessionManager>,
    cache: Option<Arc<ResponseCache>>,
    endpoints: EndpointSettings,
}

impl PortalClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> PortalClientBuilder {
        PortalClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        self.inner.chain.transport().base_url()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    /// The response cache, unless caching was disabled
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.inner.cache.as_ref()
    }

    pub fn endpoints(&self) -> &EndpointSettings {
        &self.inner.endpoints
    }

    /// Names of the middleware stages, in the order they run
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.inner.chain.stage_names()
    }

    /// Start a request for `path`
    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest {
        ApiRequest::new(method, path)
    }

    /// Run a request through the middleware chain
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.inner.chain.run(request).await
    }

    /// Run a request and decode the response body
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        self.send(request).await?.json()
    }

    /// GET `path` and decode the response body
    pub async fn get<T: DeserializeOwned>(&self, path: impl Into<String>) -> Result<T, ClientError> {
        self.execute(ApiRequest::get(path)).await
    }
}

/// Builder for PortalClient
#[derive(Default)]
pub struct PortalClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    settings: Option<ClientSettings>,
    session_store: Option<Arc<dyn KeyValueStore>>,
    cache_store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    cache_enabled: Option<bool>,
    default_cache_ttl: Option<Duration>,
    stages: Vec<Arc<dyn Stage>>,
}

impl PortalClientBuilder {
    /// Start from loaded settings. Explicit builder calls still take precedence.
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Where credentials are kept. Defaults to an in-memory store.
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Where cached responses are kept. Defaults to the session store.
    pub fn cache_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the refresh endpoint call
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = Some(ttl);
        self
    }

    /// Add a stage after the built-in ones, right before the transport
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<PortalClient, ClientError> {
        let settings = self.settings.unwrap_or_default();
        let base_url = match self.base_url {
            Some(url) => url,
            None if !settings.base_url.is_empty() => settings.base_url.clone(),
            None => return Err(ClientError::Configuration("base_url is required".into())),
        };
        let timeout = self.timeout.unwrap_or_else(|| settings.timeout());
        let user_agent = self.user_agent.unwrap_or(settings.user_agent);

        let transport = Transport::new(&base_url, Some(timeout), &user_agent)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let session_store = self
            .session_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpRefresher::new(
                transport.clone(),
                settings.endpoints.refresh.as_str(),
            ))
        });
        let cache = self
            .cache_enabled
            .unwrap_or(settings.cache.enabled)
            .then(|| {
                Arc::new(ResponseCache::new(
                    self.cache_store.unwrap_or_else(|| session_store.clone()),
                    clock.clone(),
                    &settings.cache.namespace,
                    self.default_cache_ttl
                        .unwrap_or_else(|| settings.cache.default_ttl()),
                ))
            });

        let mut session = SessionManager::new(
            session_store,
            SessionKeys::new(&settings.session.namespace),
            clock,
            refresher,
        );
        if let Some(cache) = &cache {
            session = session.with_cache(cache.clone());
        }
        let session = Arc::new(session);

        let mut chain = Chain::new(transport);
        if let Some(cache) = &cache {
            chain = chain.with(CacheLookup::new(cache.clone()));
        }
        chain = chain
            .with(RetryOnUnauthorized::new(session.clone()))
            .with(AttachCredential::new(session.clone()));
        for stage in self.stages {
            chain = chain.with_arc(stage);
        }

        debug!(base_url = %base_url, stages = ?chain.stage_names(), "client built");

        Ok(PortalClient {
            inner: Arc::new(Inner {
                chain,
                session,
                cache,
                endpoints: settings.endpoints,
            }),
        })
    }
}
