mod auth;
mod error;
mod health;
mod report;
mod sync;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{error::AuthError, management::SessionId, server::AppState};

pub use auth::{authorize, callback, logout, session};
pub use error::ApiError;
pub use health::health;
pub use report::{export, playlist_tracks, top, top_png};
pub use sync::{sync, sync_failures};

pub const SESSION_COOKIE: &str = "spotstats_session";

pub(crate) fn session_from_jar(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(Cookie::value)
        .filter(|value| !value.is_empty())
        .map(|value| SessionId(value.to_string()))
}

pub(crate) fn session_cookie(session: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Session id from the request cookie. Requests without one are rejected
/// with 401.
pub struct CurrentSession(pub SessionId);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = match CookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        session_from_jar(&jar)
            .map(CurrentSession)
            .ok_or(ApiError::Auth(AuthError::NoSession))
    }
}

/// Provider user id of the session, resolved through `/me` on first use.
pub(crate) async fn resolve_session_user(
    state: &AppState,
    session: &SessionId,
) -> Result<String, ApiError> {
    if let Some(user_id) = state.auth.session_user(session)? {
        return Ok(user_id);
    }

    let token = state.auth.get_valid_token(session).await?;
    let user = state.remote.current_user(&token).await?;
    state.auth.bind_user(session, &user.id)?;
    state.store.ensure_user(&user.id)?;
    Ok(user.id)
}
