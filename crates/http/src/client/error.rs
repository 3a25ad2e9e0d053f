//! Client error types

use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout or transport failure; no response was received
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed (401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Session or cache storage failed
    #[error("Storage error: {0}")]
    Store(#[from] portal_core::Error),

    /// The access token could not be renewed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Build the error for a failed response, preferring the server's `message` field
    pub fn from_response_body(status: reqwest::StatusCode, body: &[u8]) -> Self {
        Self::from_status(status, error_message(status, body))
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::BadRequest(_) => Some(400),
            Self::ServerError { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Whether the session is gone and the user has to log in again
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::RefreshFailed(_))
    }

    /// Whether no response was received at all
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

fn error_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| status.to_string(), str::to_string)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn maps_status_codes() {
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            ClientError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::FORBIDDEN, String::new()),
            ClientError::Forbidden(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            ClientError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn prefers_server_message_field() {
        let err = ClientError::from_response_body(
            StatusCode::BAD_REQUEST,
            br#"{"message":"title is required","code":"VALIDATION"}"#,
        );
        assert!(matches!(err, ClientError::BadRequest(ref m) if m == "title is required"));
    }

    #[test]
    fn falls_back_to_body_then_reason() {
        let err = ClientError::from_response_body(StatusCode::NOT_FOUND, b"no such post");
        assert!(matches!(err, ClientError::NotFound(ref m) if m == "no such post"));

        let err = ClientError::from_response_body(StatusCode::INTERNAL_SERVER_ERROR, b"");
        assert!(
            matches!(err, ClientError::ServerError { status: 500, ref message } if message == "Internal Server Error")
        );
    }

    #[test]
    fn auth_expiry_classification() {
        assert!(ClientError::AuthenticationFailed("x".into()).is_auth_expired());
        assert!(ClientError::RefreshFailed("x".into()).is_auth_expired());
        assert!(!ClientError::Forbidden("x".into()).is_auth_expired());
        assert_eq!(ClientError::Forbidden("x".into()).status(), Some(403));
    }
}
