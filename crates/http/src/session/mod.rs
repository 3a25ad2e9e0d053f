//! Session token manager
//!
//! Keeps the credentials of the signed-in user in a [`KeyValueStore`], puts the
//! access token on outgoing requests and renews it with the refresh token when
//! the server rejects it. Renewals are serialized: while one refresh is in
//! flight, every other caller that saw a 401 waits for it and then reuses its
//! outcome instead of issuing a refresh of its own.

pub mod refresh;
pub mod token;

pub use refresh::{HttpRefresher, TokenRefresher};

use crate::cache::ResponseCache;
use crate::client::{ApiRequest, ClientError};
use crate::types::TokenResponse;
use chrono::{DateTime, Utc};
use portal_core::{Clock, KeyValueStore, Session, SessionKeys, UserProfile};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// Changes of the stored session, for UI layers that need to react (e.g.
/// redirect to the login page on [`SessionEvent::Expired`])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were stored after login or an OAuth callback
    Established,
    /// The access token was renewed
    Refreshed,
    /// Renewal failed and the credentials were removed
    Expired,
    /// The credentials were removed on request
    LoggedOut,
}

pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    keys: SessionKeys,
    clock: Arc<dyn Clock>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    cache: Option<Arc<ResponseCache>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: SessionKeys,
        clock: Arc<dyn Clock>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            keys,
            clock,
            refresher,
            refresh_lock: Mutex::new(()),
            events,
            cache: None,
        }
    }

    /// Empty `cache` whenever the signed-in user changes, so responses fetched
    /// for one user are never served to another
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Store a new session, replacing whatever was there
    pub async fn establish(&self, session: &Session) -> Result<(), ClientError> {
        self.purge_cache().await;
        self.write(session).await?;
        info!(
            user = session.user.as_ref().map(|u| u.username.as_str()),
            refreshable = session.can_refresh(),
            "session established"
        );
        self.notify(SessionEvent::Established);
        Ok(())
    }

    /// Read the stored session, if any
    pub async fn load(&self) -> Result<Option<Session>, ClientError> {
        let Some(access_token) = self.access_token().await? else {
            return Ok(None);
        };
        let refresh_token = self.refresh_token().await?;
        let user = self.user().await?;
        let issued_at = self
            .store
            .get(&self.keys.issued_at)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map_or_else(|| self.now(), |dt| dt.with_timezone(&Utc));

        Ok(Some(Session {
            access_token,
            refresh_token,
            user,
            issued_at,
        }))
    }

    pub async fn access_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.store.get(&self.keys.access_token).await?)
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.store.get(&self.keys.refresh_token).await?)
    }

    /// Stored user profile. A corrupt profile reads as absent.
    pub async fn user(&self) -> Result<Option<UserProfile>, ClientError> {
        let Some(raw) = self.store.get(&self.keys.user).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable stored user profile");
                Ok(None)
            }
        }
    }

    /// Whether an access token is stored and not known to be expired
    pub async fn is_authenticated(&self) -> Result<bool, ClientError> {
        Ok(self
            .access_token()
            .await?
            .is_some_and(|access| !token::is_expired(&access, self.clock.now_millis())))
    }

    /// Put the stored access token on the request as a bearer credential.
    /// Requests go out unauthenticated when no token is stored.
    pub async fn attach_credential(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        if let Some(token) = self.access_token().await? {
            request.set_bearer(token);
        }
        Ok(())
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Overwrites the access token, and the refresh token when the server
    /// rotated it. On failure nothing is changed; the caller decides whether
    /// to clear the session.
    pub async fn refresh(&self) -> Result<TokenResponse, ClientError> {
        let Some(refresh_token) = self.refresh_token().await? else {
            return Err(ClientError::RefreshFailed(
                "no refresh token stored".to_string(),
            ));
        };

        let tokens = self
            .refresher
            .refresh(&refresh_token)
            .await
            .map_err(|err| ClientError::RefreshFailed(err.to_string()))?;

        self.store
            .set(&self.keys.access_token, &tokens.access_token)
            .await?;
        if let Some(rotated) = &tokens.refresh_token {
            self.store.set(&self.keys.refresh_token, rotated).await?;
        }
        if let Some(user) = &tokens.user {
            self.store
                .set(&self.keys.user, &serde_json::to_string(user)?)
                .await?;
        }
        self.store
            .set(&self.keys.issued_at, &self.now().to_rfc3339())
            .await?;

        info!(rotated = tokens.refresh_token.is_some(), "access token refreshed");
        self.notify(SessionEvent::Refreshed);
        Ok(tokens)
    }

    /// Renew the session after `stale` was rejected, at most once at a time.
    ///
    /// Callers that arrive while another refresh is running wait for it. If the
    /// stored token no longer equals `stale` someone else already renewed it
    /// and no request is sent. A failed refresh clears the session.
    pub async fn refresh_after(&self, stale: Option<&str>) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        match (self.access_token().await?, stale) {
            (Some(current), stale) if Some(current.as_str()) != stale => {
                debug!("access token already renewed by a concurrent request");
                return Ok(());
            }
            (None, Some(_)) => {
                return Err(ClientError::RefreshFailed(
                    "session was cleared while waiting".to_string(),
                ));
            }
            _ => {}
        }

        match self.refresh().await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing session");
                if let Err(clear_err) = self.expire().await {
                    warn!(error = %clear_err, "failed to clear expired session");
                }
                Err(err)
            }
        }
    }

    /// Remove every stored credential and user field
    pub async fn clear_session(&self) -> Result<(), ClientError> {
        self.remove_all().await?;
        self.purge_cache().await;
        info!("session cleared");
        self.notify(SessionEvent::LoggedOut);
        Ok(())
    }

    async fn expire(&self) -> Result<(), ClientError> {
        let had_session = self.access_token().await?.is_some();
        self.remove_all().await?;
        self.purge_cache().await;
        if had_session {
            self.notify(SessionEvent::Expired);
        }
        Ok(())
    }

    async fn purge_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.invalidate(None).await {
            warn!(error = %err, "failed to purge response cache");
        }
    }

    async fn remove_all(&self) -> Result<(), ClientError> {
        for key in self.keys.all() {
            self.store.remove(key).await?;
        }
        Ok(())
    }

    async fn write(&self, session: &Session) -> Result<(), ClientError> {
        self.store
            .set(&self.keys.access_token, &session.access_token)
            .await?;
        match &session.refresh_token {
            Some(token) => self.store.set(&self.keys.refresh_token, token).await?,
            None => self.store.remove(&self.keys.refresh_token).await?,
        }
        match &session.user {
            Some(user) => {
                self.store
                    .set(&self.keys.user, &serde_json::to_string(user)?)
                    .await?;
            }
            None => self.store.remove(&self.keys.user).await?,
        }
        self.store
            .set(&self.keys.issued_at, &session.issued_at.to_rfc3339())
            .await?;
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_millis()).unwrap_or_else(Utc::now)
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
