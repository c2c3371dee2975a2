use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use super::{ApiError, CurrentSession, resolve_session_user};
use crate::{
    server::AppState,
    sync::SyncOptions,
    types::{SyncFailure, SyncReport},
};

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub force: bool,
}

/// Runs one sync pass for the logged in user.
pub async fn sync(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncReport>, ApiError> {
    let user_id = resolve_session_user(&state, &session).await?;
    let report = state
        .sync
        .sync_user_library(&session, &user_id, SyncOptions { force: params.force })
        .await?;
    Ok(Json(report))
}

/// Playlists whose latest sync attempt failed and that have not synced since.
pub async fn sync_failures(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<Vec<SyncFailure>>, ApiError> {
    let user_id = resolve_session_user(&state, &session).await?;
    Ok(Json(state.store.sync_failures_for_user(&user_id)?))
}
