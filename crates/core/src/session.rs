//! Session record persisted between requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile of the user a session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Credentials of an authenticated user.
///
/// A session without a refresh token cannot be renewed silently; the first
/// rejected request ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            user: None,
            issued_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Well-known storage keys for the fields of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub access_token: String,
    pub refresh_token: String,
    pub user: String,
    pub issued_at: String,
}

impl SessionKeys {
    pub fn new(namespace: &str) -> Self {
        Self {
            access_token: format!("{namespace}:token"),
            refresh_token: format!("{namespace}:refreshToken"),
            user: format!("{namespace}:user"),
            issued_at: format!("{namespace}:issuedAt"),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [
            &self.access_token,
            &self.refresh_token,
            &self.user,
            &self.issued_at,
        ]
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self::new("portal")
    }
}
