//! Error taxonomy shared by the token lifecycle, the sync path and the reports.
//!
//! Each concern gets its own enum so callers can decide what is fatal:
//!
//! - [`AuthError`] - credentials are missing, mismatched or revoked. The user
//!   has to go through `/authorize` again.
//! - [`RemoteFetchError`] - a provider call failed after the retry policy gave
//!   up. During a sync pass it only affects the playlist being fetched.
//! - [`PersistenceError`] - a database read or write failed. Writes are rolled
//!   back per playlist.
//! - [`NoDataError`] - a report was requested for a user that never synced.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authorization in progress or state mismatch")]
    StateMismatch,

    #[error("authorization request expired, start again")]
    StateExpired,

    #[error("authorization denied by provider: {0}")]
    Denied(String),

    #[error("provider rejected the authorization code: {0}")]
    Rejected(String),

    #[error("no authenticated session")]
    NoSession,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The token endpoint could not be reached or answered with a server
    /// error. Stored credentials stay untouched.
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("invalid authorize url: {0}")]
    AuthorizeUrl(String),

    #[error("session store unavailable: {0}")]
    Store(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum RemoteFetchError {
    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider rejected the access token")]
    Unauthorized,

    #[error("request to {url} failed with status {status}")]
    Status { status: StatusCode, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl RemoteFetchError {
    /// Whether another attempt of the same request can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteFetchError::RateLimited { .. } => true,
            RemoteFetchError::Status { status, .. } => matches!(
                *status,
                StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            RemoteFetchError::Network(e) => e.is_timeout() || e.is_connect(),
            RemoteFetchError::Unauthorized | RemoteFetchError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: usize, supported: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
#[error("no synced data for user {user_id}")]
pub struct NoDataError {
    pub user_id: String,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    NoData(#[from] NoDataError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("chart rendering failed: {0}")]
    Render(#[from] image::ImageError),

    #[error("export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that abort a whole sync pass. Failures of single playlists are not
/// errors of the pass, they end up in the [`crate::types::SyncReport`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to list playlists: {0}")]
    Remote(#[from] RemoteFetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}
