use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::{
    api,
    config::Settings,
    management::{SqliteStore, TokenStore},
    spotify::{
        auth::{OAuthSessionManager, SpotifyTokenEndpoint},
        client::{RemoteLibrary, SpotifyClient},
    },
    sync::SyncService,
};

/// Shared handles of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<OAuthSessionManager>,
    pub remote: Arc<dyn RemoteLibrary>,
    pub store: Arc<SqliteStore>,
    pub sync: Arc<SyncService>,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        auth: Arc<OAuthSessionManager>,
        remote: Arc<dyn RemoteLibrary>,
        cookie_secure: bool,
    ) -> Self {
        let sync = Arc::new(SyncService::new(store.clone(), remote.clone(), auth.clone()));
        Self {
            auth,
            remote,
            store,
            sync,
            cookie_secure,
        }
    }

    /// Wires the SQLite store, the provider clients and the session manager.
    ///
    /// Sessions are kept in the same database as the library data.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::new(&settings.database_path)
                .with_context(|| format!("opening database {:?}", settings.database_path))?,
        );
        let endpoint = Arc::new(SpotifyTokenEndpoint::new(
            settings.spotify.clone(),
            settings.http_timeout,
        )?);
        let sessions: Arc<dyn TokenStore> = store.clone();
        let auth = Arc::new(OAuthSessionManager::new(
            sessions,
            endpoint,
            settings.spotify.clone(),
            settings.refresh_margin,
        ));
        let remote = Arc::new(SpotifyClient::new(
            &settings.spotify.api_url,
            settings.http_timeout,
            settings.retry.clone(),
        )?);

        Ok(Self::new(store, auth, remote, settings.cookie_secure))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/authorize", get(api::authorize))
        .route("/callback", get(api::callback))
        .route("/session", get(api::session))
        .route("/logout", post(api::logout))
        .route("/sync", post(api::sync))
        .route("/sync/failures", get(api::sync_failures))
        .route("/report/top", get(api::top))
        .route("/report/top.png", get(api::top_png))
        .route("/export", get(api::export))
        .route("/playlists/{id}/tracks", get(api::playlist_tracks))
        .with_state(state)
}

pub async fn start_api_server(settings: &Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(settings.server_addr)
        .await
        .with_context(|| format!("binding {}", settings.server_addr))?;
    info!("Listening on http://{}", settings.server_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
