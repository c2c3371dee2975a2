use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::error::{
    AuthError, NoDataError, PersistenceError, RemoteFetchError, ReportError, SyncError,
};

/// Error returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    NoData(#[from] NoDataError),

    #[error(transparent)]
    Remote(#[from] RemoteFetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Internal(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Auth(e) => ApiError::Auth(e),
            SyncError::Remote(e) => ApiError::Remote(e),
            SyncError::Persistence(e) => ApiError::Persistence(e),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::NoData(e) => ApiError::NoData(e),
            ReportError::Persistence(e) => ApiError::Persistence(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let reauthenticate = json!({ "detail": detail, "reauthenticate": true });

        let (status, body) = match self {
            ApiError::Auth(AuthError::Store(e)) | ApiError::Persistence(e) => {
                error!("Persistence failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": detail }))
            }
            ApiError::Auth(AuthError::Unavailable(_)) => {
                (StatusCode::BAD_GATEWAY, json!({ "detail": detail }))
            }
            ApiError::Auth(_) | ApiError::Remote(RemoteFetchError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, reauthenticate)
            }
            ApiError::NoData(_) => (StatusCode::NOT_FOUND, json!({ "detail": detail })),
            ApiError::Remote(_) => (StatusCode::BAD_GATEWAY, json!({ "detail": detail })),
            ApiError::Internal(_) => {
                error!("Internal failure: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": detail }))
            }
        };

        (status, Json(body)).into_response()
    }
}
