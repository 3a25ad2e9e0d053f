//! Serves cacheable requests from the response cache

use super::{Next, Stage};
use crate::cache::{Lookup, ResponseCache};
use crate::client::{ApiRequest, ApiResponse, ClientError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers GET requests from the cache and stores successful responses.
///
/// Hits are reported as `200 OK` with `from_cache` set; the original 2xx
/// status is not kept.
///
/// The cache is best effort: a failing store is logged and the request goes
/// to the network as if the cache were empty.
pub struct CacheLookup {
    cache: Arc<ResponseCache>,
}

impl CacheLookup {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Stage for CacheLookup {
    fn name(&self) -> &'static str {
        "cache-lookup"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ClientError> {
        if !request.is_cacheable() {
            return next.run(request).await;
        }

        let key = request.cache_key();
        match self.cache.get(&key).await {
            Ok(Lookup::Hit(body)) => return Ok(ApiResponse::cached(body)),
            Ok(Lookup::Miss) => debug!(key = %key, "cache miss"),
            Err(err) => warn!(key = %key, error = %err, "cache read failed"),
        }

        let ttl = request.cache_ttl().unwrap_or(self.cache.default_ttl());
        let response = next.run(request).await?;
        if response.status().is_success() {
            if let Err(err) = self.cache.put(&key, response.body(), ttl).await {
                warn!(key = %key, error = %err, "cache write failed");
            }
        }
        Ok(response)
    }
}
