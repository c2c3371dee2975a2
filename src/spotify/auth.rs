use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::SpotifySettings,
    error::AuthError,
    management::{PendingAuthorization, SessionId, SessionRecord, TokenStore},
    types::{ProviderError, Token, TokenResponse},
    utils,
};

/// Seconds a started authorization may take before its state is refused.
pub const PENDING_AUTHORIZATION_TTL_SECS: i64 = 600;

/// Provider token endpoint: code exchange and refresh.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Talks to the Spotify accounts service.
///
/// Public clients authenticate with PKCE only. When a client secret is
/// configured it is sent as HTTP basic auth in addition.
pub struct SpotifyTokenEndpoint {
    client: Client,
    settings: SpotifySettings,
}

impl SpotifyTokenEndpoint {
    pub fn new(settings: SpotifySettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, settings })
    }

    /// Posts `form` to the token endpoint.
    ///
    /// A `4xx` answer means the grant itself was refused and is mapped through
    /// `refused`. Transport failures, `5xx` answers and unreadable bodies are
    /// [`AuthError::Unavailable`] since the grant may still be good.
    async fn request(
        &self,
        form: &[(&str, &str)],
        refused: fn(String) -> AuthError,
    ) -> Result<TokenResponse, AuthError> {
        let unavailable = |e: reqwest::Error| AuthError::Unavailable(e.to_string());

        let mut request = self.client.post(&self.settings.token_url).form(form);
        if let Some(secret) = &self.settings.client_secret {
            request = request.basic_auth(&self.settings.client_id, Some(secret));
        }

        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::Unavailable(format!(
                "token endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(refused(match serde_json::from_str::<ProviderError>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => format!("token endpoint returned {status}"),
            }));
        }

        response.json::<TokenResponse>().await.map_err(unavailable)
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let form: &[(&str, &str)] = &[
            ("grant_type", "authorization_code"),
            ("client_id", &self.settings.client_id),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", &self.settings.redirect_uri),
        ];
        self.request(form, AuthError::Rejected).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let form: &[(&str, &str)] = &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.settings.client_id),
        ];
        self.request(form, AuthError::RefreshFailed).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    /// Authorization started, waiting for the provider callback.
    Pending,
    Authenticated,
    /// Access token expired or inside the refresh margin. The next
    /// `get_valid_token` refreshes it.
    Expired,
}

/// Session overview without any secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub state: SessionState,
    pub user_id: Option<String>,
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
}

/// Drives the per-session OAuth state machine:
///
/// ```text
/// Unauthenticated --begin--> Pending --complete--> Authenticated
///                                                   |        ^
///                                             expiry|        |refresh
///                                                   v        |
///                                                  Expired ---
/// ```
///
/// A refused refresh or [`OAuthSessionManager::clear_session`] brings the
/// session back to `Unauthenticated`. An unreachable token endpoint leaves
/// the stored token in place.
pub struct OAuthSessionManager {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    settings: SpotifySettings,
    refresh_margin: Duration,
}

impl OAuthSessionManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        settings: SpotifySettings,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            endpoint,
            settings,
            refresh_margin,
        }
    }

    /// Starts an authorization and returns the provider URL to redirect to.
    ///
    /// Only the pending record (state and PKCE verifier) is stored.
    pub fn begin_authorization(
        &self,
        session: &SessionId,
        next_url: Option<&str>,
    ) -> Result<AuthorizationRequest, AuthError> {
        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);
        let state = utils::generate_state();

        let url = Url::parse_with_params(
            &self.settings.auth_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", self.settings.scope.as_str()),
                ("state", state.as_str()),
                ("code_challenge", code_challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::AuthorizeUrl(e.to_string()))?;

        let mut record = self.store.get(session)?.unwrap_or_default();
        record.pending = Some(PendingAuthorization {
            state: state.clone(),
            code_verifier,
            next_url: utils::sanitize_next_url(next_url),
            created_at: Utc::now().timestamp(),
        });
        self.store.set(session, &record)?;

        debug!("Authorization started for session {}", session);
        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    /// Finishes the authorization started by [`Self::begin_authorization`].
    ///
    /// The pending record is consumed whatever the outcome. On success the
    /// token pair is stored and the requested redirect target returned.
    pub async fn complete_authorization(
        &self,
        session: &SessionId,
        code: &str,
        state: &str,
    ) -> Result<Option<String>, AuthError> {
        let mut record = self.store.get(session)?.unwrap_or_default();
        let Some(pending) = record.pending.take() else {
            warn!("Callback for session {} without pending authorization", session);
            return Err(AuthError::StateMismatch);
        };
        self.store.set(session, &record)?;

        if pending.state != state {
            warn!("State mismatch on callback for session {}", session);
            return Err(AuthError::StateMismatch);
        }

        let now = Utc::now().timestamp();
        if now - pending.created_at > PENDING_AUTHORIZATION_TTL_SECS {
            return Err(AuthError::StateExpired);
        }

        let response = self
            .endpoint
            .exchange_code(code, &pending.code_verifier)
            .await?;

        record.token = Some(Token::from_response(response, None, now));
        // a new login may belong to another provider account
        record.user_id = None;
        self.store.set(session, &record)?;

        info!("Session {} authenticated", session);
        Ok(pending.next_url)
    }

    /// Drops a pending authorization, e.g. after the provider reported an error.
    pub fn discard_pending(&self, session: &SessionId) -> Result<(), AuthError> {
        if let Some(mut record) = self.store.get(session)? {
            if record.pending.take().is_some() {
                self.store.set(session, &record)?;
            }
        }
        Ok(())
    }

    /// Returns an access token that is valid for at least the refresh margin,
    /// refreshing it first when needed.
    pub async fn get_valid_token(&self, session: &SessionId) -> Result<String, AuthError> {
        let mut record = self.store.get(session)?.ok_or(AuthError::NoSession)?;
        let token = record.token.clone().ok_or(AuthError::NoSession)?;

        let now = Utc::now().timestamp();
        if !self.needs_refresh(&token, now) {
            return Ok(token.access_token);
        }

        debug!("Refreshing access token for session {}", session);
        let refreshed = match self.refresh(&token, now).await {
            Ok(refreshed) => refreshed,
            Err(e @ AuthError::Unavailable(_)) => {
                warn!("Token endpoint unavailable for session {}: {}", session, e);
                return Err(e);
            }
            Err(e) => {
                warn!("Token refresh failed for session {}: {}", session, e);
                record.token = None;
                self.store.set(session, &record)?;
                return Err(e);
            }
        };

        let access_token = refreshed.access_token.clone();
        record.token = Some(refreshed);
        self.store.set(session, &record)?;
        Ok(access_token)
    }

    async fn refresh(&self, token: &Token, now: i64) -> Result<Token, AuthError> {
        if token.refresh_token.is_empty() {
            return Err(AuthError::RefreshFailed("no refresh token stored".to_string()));
        }

        let response = self
            .endpoint
            .refresh(&token.refresh_token)
            .await
            .map_err(|e| match e {
                AuthError::RefreshFailed(_) | AuthError::Unavailable(_) => e,
                other => AuthError::RefreshFailed(other.to_string()),
            })?;

        let mut refreshed = Token::from_response(response, Some(&token.refresh_token), now);
        if refreshed.scope.is_empty() {
            refreshed.scope = token.scope.clone();
        }
        if refreshed.expires_at <= now {
            return Err(AuthError::RefreshFailed(
                "provider issued an already expired token".to_string(),
            ));
        }
        Ok(refreshed)
    }

    fn needs_refresh(&self, token: &Token, now: i64) -> bool {
        now + self.refresh_margin.as_secs() as i64 >= token.expires_at
    }

    /// Discards everything stored for the session. Idempotent.
    pub fn clear_session(&self, session: &SessionId) -> Result<(), AuthError> {
        self.store.clear(session)?;
        info!("Session {} cleared", session);
        Ok(())
    }

    pub fn session_state(&self, session: &SessionId) -> Result<SessionState, AuthError> {
        Ok(self.session_info(session)?.state)
    }

    pub fn session_info(&self, session: &SessionId) -> Result<SessionInfo, AuthError> {
        let record = self.store.get(session)?.unwrap_or_default();
        let now = Utc::now().timestamp();

        let state = match (&record.token, &record.pending) {
            (Some(token), _) if self.needs_refresh(token, now) => SessionState::Expired,
            (Some(_), _) => SessionState::Authenticated,
            (None, Some(_)) => SessionState::Pending,
            (None, None) => SessionState::Unauthenticated,
        };

        Ok(SessionInfo {
            state,
            user_id: record.user_id,
            expires_at: record.token.as_ref().map(|t| t.expires_at),
            scope: record.token.map(|t| t.scope),
        })
    }

    /// Remembers the provider user id the session's token belongs to.
    pub fn bind_user(&self, session: &SessionId, user_id: &str) -> Result<(), AuthError> {
        let mut record: SessionRecord = self.store.get(session)?.ok_or(AuthError::NoSession)?;
        record.user_id = Some(user_id.to_string());
        self.store.set(session, &record)?;
        Ok(())
    }

    pub fn session_user(&self, session: &SessionId) -> Result<Option<String>, AuthError> {
        Ok(self.store.get(session)?.and_then(|record| record.user_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::management::MemoryTokenStore;

    #[derive(Default)]
    struct CountingEndpoint {
        refreshes: Mutex<u32>,
    }

    #[async_trait]
    impl TokenEndpoint for CountingEndpoint {
        async fn exchange_code(
            &self,
            _code: &str,
            _verifier: &str,
        ) -> Result<TokenResponse, AuthError> {
            Ok(TokenResponse {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                scope: Some("playlist-read-private".to_string()),
                expires_in: 3600,
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, AuthError> {
            *self.refreshes.lock().unwrap() += 1;
            Ok(TokenResponse {
                access_token: "refreshed".to_string(),
                refresh_token: None,
                scope: None,
                expires_in: 3600,
            })
        }
    }

    fn settings() -> SpotifySettings {
        SpotifySettings {
            client_id: "client".to_string(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8080/callback".to_string(),
            scope: "playlist-read-private playlist-read-collaborative".to_string(),
            auth_url: "https://accounts.example.com/authorize".to_string(),
            token_url: "https://accounts.example.com/api/token".to_string(),
            api_url: "https://api.example.com/v1".to_string(),
        }
    }

    fn manager() -> (OAuthSessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = OAuthSessionManager::new(
            store.clone(),
            Arc::new(CountingEndpoint::default()),
            settings(),
            Duration::from_secs(30),
        );
        (manager, store)
    }

    #[test]
    fn test_authorize_url_contains_pkce_parameters() {
        let (manager, store) = manager();
        let session = SessionId::generate();

        let request = manager.begin_authorization(&session, Some("/report/top")).unwrap();
        let url = Url::parse(&request.url).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["scope"], "playlist-read-private playlist-read-collaborative");

        let record = store.get(&session).unwrap().unwrap();
        assert!(record.token.is_none());
        let pending = record.pending.unwrap();
        assert_eq!(
            params["code_challenge"],
            utils::generate_code_challenge(&pending.code_verifier)
        );
        assert_eq!(pending.next_url.as_deref(), Some("/report/top"));
    }

    #[test]
    fn test_external_next_url_is_dropped() {
        let (manager, store) = manager();
        let session = SessionId::generate();

        manager
            .begin_authorization(&session, Some("https://evil.example.com"))
            .unwrap();
        let pending = store.get(&session).unwrap().unwrap().pending.unwrap();
        assert!(pending.next_url.is_none());
    }

    #[tokio::test]
    async fn test_state_expires() {
        let (manager, store) = manager();
        let session = SessionId::generate();
        let request = manager.begin_authorization(&session, None).unwrap();

        let mut record = store.get(&session).unwrap().unwrap();
        if let Some(pending) = record.pending.as_mut() {
            pending.created_at -= PENDING_AUTHORIZATION_TTL_SECS + 1;
        }
        store.set(&session, &record).unwrap();

        let err = manager
            .complete_authorization(&session, "code", &request.state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateExpired));
        assert!(store.get(&session).unwrap().unwrap().token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let (manager, store) = manager();
        let session = SessionId::generate();
        store
            .set(
                &session,
                &SessionRecord {
                    token: Some(Token {
                        access_token: "old".to_string(),
                        refresh_token: "keep-me".to_string(),
                        scope: "playlist-read-private".to_string(),
                        expires_at: Utc::now().timestamp() + 10,
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(manager.session_state(&session).unwrap(), SessionState::Expired);
        assert_eq!(manager.get_valid_token(&session).await.unwrap(), "refreshed");

        let token = store.get(&session).unwrap().unwrap().token.unwrap();
        assert_eq!(token.refresh_token, "keep-me");
        assert_eq!(
            manager.session_state(&session).unwrap(),
            SessionState::Authenticated
        );
    }

    #[test]
    fn test_bind_user_requires_session() {
        let (manager, _store) = manager();
        let err = manager
            .bind_user(&SessionId::generate(), "user1")
            .unwrap_err();
        assert!(matches!(err, AuthError::NoSession));
    }
}
