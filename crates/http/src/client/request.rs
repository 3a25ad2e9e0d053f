//! Request and response values passed through the middleware chain

use super::error::ClientError;
use crate::cache::key::{canonical_query, derive_key};
use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::time::Duration;

/// An API call on its way through the middleware chain
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    params: Map<String, Value>,
    body: Option<Value>,
    bearer: Option<String>,
    cache_ttl: Option<Duration>,
    skip_cache: bool,
    skip_auth_retry: bool,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Map::new(),
            body: None,
            bearer: None,
            cache_ttl: None,
            skip_cache: false,
            skip_auth_retry: false,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add every field of a serializable struct or map as query parameters
    pub fn params<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self, ClientError> {
        match serde_json::to_value(params)? {
            Value::Object(map) => self.params.extend(map),
            Value::Null => {}
            other => {
                return Err(ClientError::Configuration(format!(
                    "query parameters must serialize to an object, got {other}"
                )));
            }
        }
        Ok(self)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Override how long a successful response stays cached
    pub fn cache_for(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Always go to the network and never store the response
    pub fn no_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    /// A 401 on this request is final; no refresh is attempted
    pub fn without_auth_retry(mut self) -> Self {
        self.skip_auth_retry = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn set_bearer(&mut self, token: impl Into<String>) {
        self.bearer = Some(token.into());
    }

    pub fn clear_bearer(&mut self) {
        self.bearer = None;
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Only idempotent reads are served from or written to the cache
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && !self.skip_cache
    }

    pub fn allows_auth_retry(&self) -> bool {
        !self.skip_auth_retry && !self.retried
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Cache key identifying this request
    pub fn cache_key(&self) -> String {
        derive_key(&self.method, &self.path, &self.params)
    }

    /// Query pairs in canonical order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        canonical_query(&self.params)
    }
}

/// A successful response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: StatusCode,
    body: Value,
    from_cache: bool,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            from_cache: false,
        }
    }

    /// A response served from the cache without touching the network.
    ///
    /// Only the body is cached, so the status is always `200 OK` whatever
    /// 2xx status the server originally answered with.
    pub fn cached(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            from_cache: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// Deserialize the body
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_plain_gets_are_cacheable() {
        assert!(ApiRequest::get("/posts").is_cacheable());
        assert!(!ApiRequest::get("/posts").no_cache().is_cacheable());
        assert!(!ApiRequest::post("/posts").is_cacheable());
    }

    #[test]
    fn retry_is_allowed_once() {
        let mut request = ApiRequest::get("/posts/5");
        assert!(request.allows_auth_retry());
        request.mark_retried();
        assert!(!request.allows_auth_retry());
        assert!(!ApiRequest::post("/auth/login").without_auth_retry().allows_auth_retry());
    }

    #[test]
    fn params_from_struct() {
        #[derive(Serialize)]
        struct Page {
            page: u32,
            size: u32,
        }

        let request = ApiRequest::get("/posts")
            .params(&Page { page: 2, size: 20 })
            .unwrap();
        assert_eq!(
            request.query_pairs(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("size".to_string(), "20".to_string())
            ]
        );

        assert!(ApiRequest::get("/posts").params(&json!([1, 2])).is_err());
    }
}
