use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::{ApiError, resolve_session_user, session_from_jar};
use crate::{
    error::AuthError,
    report::{self, ChartOptions, ExportFormat},
    server::AppState,
    types::{EntityKind, RankedEntity, TrackRecord},
};

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Deserialize)]
pub struct TopParams {
    #[serde(default = "default_kind")]
    pub kind: EntityKind,
    #[serde(default = "default_n")]
    pub n: usize,
    pub user: Option<String>,
}

fn default_kind() -> EntityKind {
    EntityKind::Track
}

fn default_n() -> usize {
    DEFAULT_TOP_N
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub format: ExportFormat,
    pub user: Option<String>,
}

/// Explicit `user` parameter first, then the session's user.
async fn report_user(
    state: &AppState,
    jar: &CookieJar,
    user: Option<String>,
) -> Result<String, ApiError> {
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        return Ok(user);
    }
    let session = session_from_jar(jar).ok_or(AuthError::NoSession)?;
    resolve_session_user(state, &session).await
}

pub async fn top(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<TopParams>,
) -> Result<Json<Vec<RankedEntity>>, ApiError> {
    let user_id = report_user(&state, &jar, params.user).await?;
    let ranked = report::top_n(&state.store, params.kind, params.n, &user_id)?;
    Ok(Json(ranked))
}

pub async fn top_png(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<TopParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = report_user(&state, &jar, params.user).await?;
    let ranked = report::top_n(&state.store, params.kind, params.n, &user_id)?;
    let png = report::render_bar_chart(&ranked, &ChartOptions::default())?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub async fn export(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = report_user(&state, &jar, params.user).await?;
    let body = report::export(&state.store, &user_id, params.format)?;

    let disposition = format!(
        "attachment; filename=\"spotstats-{}.{}\"",
        user_id.replace(['"', '\\'], "_"),
        params.format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, params.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// Tracks of a persisted playlist, as of the last sync.
pub async fn playlist_tracks(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<Json<Vec<TrackRecord>>, ApiError> {
    Ok(Json(state.store.tracks_for_playlist(&playlist_id)?))
}
