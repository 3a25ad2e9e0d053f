//! Final stage of the chain: puts requests on the wire

use super::error::ClientError;
use super::request::{ApiRequest, ApiResponse};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Sends requests relative to a base URL and classifies the responses
#[derive(Clone, Debug)]
pub struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("base_url is empty".into()));
        }
        let parsed = Url::parse(&base_url).map_err(|err| {
            ClientError::Configuration(format!("invalid base_url {base_url:?}: {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "base_url {base_url:?} must use http or https"
            )));
        }

        let mut builder = ClientBuilder::new().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send the request as-is. Non-2xx statuses come back as errors.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut builder = self
            .client
            .request(request.method().clone(), self.url(request.path()));

        let query = request.query_pairs();
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            authenticated = request.bearer().is_some(),
            retry = request.is_retry(),
            "sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            Ok(ApiResponse::new(status, decode_body(&bytes)))
        } else {
            debug!(status = status.as_u16(), path = request.path(), "request failed");
            Err(ClientError::from_response_body(status, &bytes))
        }
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
