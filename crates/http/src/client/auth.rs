//! Authentication API client methods

use super::{ApiRequest, ClientError, PortalClient};
use crate::types::{LoginRequest, RegisterRequest, TokenResponse};
use portal_core::{Session, UserProfile};
use tracing::{info, warn};

impl PortalClient {
    /// Log in with email and password and store the issued session
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, ClientError> {
        let request = ApiRequest::post(self.endpoints().login.as_str())
            .without_auth_retry()
            .json(credentials)?;
        let tokens: TokenResponse = self.execute(request).await?;
        self.adopt_tokens(tokens).await
    }

    /// Create an account. The user still has to log in afterwards.
    pub async fn register(&self, account: &RegisterRequest) -> Result<UserProfile, ClientError> {
        let request = ApiRequest::post(self.endpoints().register.as_str())
            .without_auth_retry()
            .json(account)?;
        self.execute(request).await
    }

    /// Store tokens handed over by an OAuth provider redirect
    pub async fn adopt_oauth_token(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<Session, ClientError> {
        let session = Session::new(access_token, refresh_token);
        self.session().establish(&session).await?;
        Ok(session)
    }

    /// Parse the query string of an OAuth callback and store its tokens.
    ///
    /// Accepts `token`, `refreshToken` and `error` parameters, with or without
    /// a leading `?`. An `error` parameter or a missing token fails with
    /// [`ClientError::AuthenticationFailed`].
    pub async fn handle_oauth_callback(&self, query: &str) -> Result<Session, ClientError> {
        let query = query.split_once('?').map_or(query, |(_, rest)| rest);

        let mut token = None;
        let mut refresh_token = None;
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "token" => token = Some(value.into_owned()),
                "refreshToken" => refresh_token = Some(value.into_owned()),
                "error" => return Err(ClientError::AuthenticationFailed(value.into_owned())),
                _ => {}
            }
        }

        match token.filter(|token| !token.is_empty()) {
            Some(token) => self.adopt_oauth_token(token, refresh_token).await,
            None => Err(ClientError::AuthenticationFailed(
                "callback carried no token".to_string(),
            )),
        }
    }

    /// Tell the server the session ends, then forget it locally.
    ///
    /// The local session is cleared even when the server cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if self.session().access_token().await?.is_some() {
            let request = ApiRequest::post(self.endpoints().logout.as_str())
                .without_auth_retry()
                .no_cache();
            if let Err(err) = self.send(request).await {
                warn!(error = %err, "server logout failed");
            }
        }
        self.session().clear_session().await?;
        info!("logged out");
        Ok(())
    }

    /// The stored session, if any
    pub async fn current_session(&self) -> Result<Option<Session>, ClientError> {
        self.session().load().await
    }

    async fn adopt_tokens(&self, tokens: TokenResponse) -> Result<Session, ClientError> {
        let mut session = Session::new(tokens.access_token, tokens.refresh_token);
        if let Some(user) = tokens.user {
            session = session.with_user(user);
        }
        self.session().establish(&session).await?;
        Ok(session)
    }
}
