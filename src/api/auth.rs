use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use tracing::{info, warn};

use super::{ApiError, session_cookie, session_from_jar};
use crate::{
    error::AuthError,
    management::SessionId,
    server::AppState,
    spotify::auth::{SessionInfo, SessionState},
};

/// Redirect target after a login without `next_url`.
pub const DEFAULT_NEXT_URL: &str = "/session";

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Starts a login and redirects the user agent to the provider.
pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AuthorizeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_from_jar(&jar).unwrap_or_else(SessionId::generate);
    let request = state
        .auth
        .begin_authorization(&session, params.next_url.as_deref())?;

    let jar = jar.add(session_cookie(&session, state.cookie_secure));
    Ok((jar, Redirect::to(&request.url)))
}

/// Provider redirect after the user granted or denied access.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_from_jar(&jar).ok_or(AuthError::StateMismatch)?;

    if let Some(reason) = params.error {
        warn!("Provider denied authorization: {}", reason);
        state.auth.discard_pending(&session)?;
        return Err(AuthError::Denied(reason).into());
    }

    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        state.auth.discard_pending(&session)?;
        return Err(AuthError::StateMismatch.into());
    };

    let next_url = state
        .auth
        .complete_authorization(&session, &code, &returned_state)
        .await?;

    let token = state.auth.get_valid_token(&session).await?;
    let user = state.remote.current_user(&token).await?;
    state.auth.bind_user(&session, &user.id)?;
    state.store.ensure_user(&user.id)?;
    info!(user_id = %user.id, "User logged in");

    Ok(Redirect::to(next_url.as_deref().unwrap_or(DEFAULT_NEXT_URL)))
}

/// Session overview, never exposes tokens.
pub async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = match session_from_jar(&jar) {
        Some(session) => state.auth.session_info(&session)?,
        None => SessionInfo {
            state: SessionState::Unauthenticated,
            user_id: None,
            expires_at: None,
            scope: None,
        },
    };
    Ok(Json(info))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(session) = session_from_jar(&jar) {
        state.auth.clear_session(&session)?;
    }
    let jar = jar.remove(Cookie::build(super::SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}
