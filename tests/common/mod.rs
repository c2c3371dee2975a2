#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use spotstats::{
    config::SpotifySettings,
    error::{AuthError, RemoteFetchError},
    management::{SessionId, SessionRecord, SqliteStore, TokenStore},
    spotify::{
        auth::{OAuthSessionManager, TokenEndpoint},
        client::RemoteLibrary,
    },
    types::{
        Album, ArtistRef, CurrentUser, Playlist, PlaylistItem, PlaylistOwner, Token,
        TokenResponse, Track,
    },
};
use tempfile::TempDir;

pub fn spotify_settings() -> SpotifySettings {
    SpotifySettings {
        client_id: "client".to_string(),
        client_secret: None,
        redirect_uri: "http://127.0.0.1:8080/callback".to_string(),
        scope: "playlist-read-private".to_string(),
        auth_url: "https://accounts.example.com/authorize".to_string(),
        token_url: "https://accounts.example.com/api/token".to_string(),
        api_url: "https://api.example.com/v1".to_string(),
    }
}

pub fn create_tmp_store() -> (Arc<SqliteStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("spotstats.db")).unwrap();
    (Arc::new(store), temp_dir)
}

/// Token endpoint answering from canned results.
#[derive(Default)]
pub struct FakeTokenEndpoint {
    pub reject_code: bool,
    pub reject_refresh: bool,
    /// Fail refreshes as if the endpoint could not be reached.
    pub unavailable: bool,
    /// Omit the refresh token in refresh responses.
    pub omit_refresh_token: bool,
    pub exchanges: Mutex<Vec<(String, String)>>,
    pub refreshes: Mutex<Vec<String>>,
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.exchanges
            .lock()
            .unwrap()
            .push((code.to_string(), code_verifier.to_string()));
        if self.reject_code {
            return Err(AuthError::Rejected("invalid_grant".to_string()));
        }
        Ok(TokenResponse {
            access_token: format!("access-{code}"),
            refresh_token: Some(format!("refresh-{code}")),
            scope: Some("playlist-read-private".to_string()),
            expires_in: 3600,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let count = {
            let mut refreshes = self.refreshes.lock().unwrap();
            refreshes.push(refresh_token.to_string());
            refreshes.len()
        };
        if self.unavailable {
            return Err(AuthError::Unavailable("connection refused".to_string()));
        }
        if self.reject_refresh {
            return Err(AuthError::RefreshFailed("invalid_grant".to_string()));
        }
        Ok(TokenResponse {
            access_token: format!("refreshed-{count}"),
            refresh_token: (!self.omit_refresh_token).then(|| format!("rotated-{count}")),
            scope: None,
            expires_in: 3600,
        })
    }
}

pub fn manager_with(
    store: Arc<dyn TokenStore>,
    endpoint: Arc<FakeTokenEndpoint>,
) -> OAuthSessionManager {
    OAuthSessionManager::new(store, endpoint, spotify_settings(), Duration::from_secs(30))
}

/// Stores a token for `session` expiring `expires_in` seconds from now.
pub fn store_token(store: &dyn TokenStore, session: &SessionId, expires_in: i64) {
    store
        .set(
            session,
            &SessionRecord {
                token: Some(Token {
                    access_token: "stored-access".to_string(),
                    refresh_token: "stored-refresh".to_string(),
                    scope: "playlist-read-private".to_string(),
                    expires_at: Utc::now().timestamp() + expires_in,
                }),
                ..Default::default()
            },
        )
        .unwrap();
}

pub fn track(id: &str, artist_id: &str, album_id: &str) -> PlaylistItem {
    PlaylistItem {
        is_local: false,
        track: Some(Track {
            id: Some(id.to_string()),
            name: format!("Track {id}"),
            duration_ms: Some(200_000),
            album: Some(Album {
                id: Some(album_id.to_string()),
                name: format!("Album {album_id}"),
                release_date: Some("2020-05".to_string()),
                release_date_precision: Some("month".to_string()),
                artists: vec![ArtistRef {
                    id: Some(artist_id.to_string()),
                    name: format!("Artist {artist_id}"),
                }],
            }),
            artists: vec![ArtistRef {
                id: Some(artist_id.to_string()),
                name: format!("Artist {artist_id}"),
            }],
        }),
    }
}

pub fn playlist(id: &str, owner: &str, snapshot: &str) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: format!("Playlist {id}"),
        owner: PlaylistOwner {
            id: owner.to_string(),
        },
        snapshot_id: Some(snapshot.to_string()),
    }
}

/// In-memory provider library.
#[derive(Default)]
pub struct FakeLibrary {
    pub user_id: String,
    pub playlists: Mutex<Vec<Playlist>>,
    pub tracks: Mutex<HashMap<String, Vec<PlaylistItem>>>,
    pub failing_playlists: Mutex<HashSet<String>>,
    pub fail_listing: Mutex<bool>,
    pub track_fetches: Mutex<Vec<String>>,
}

impl FakeLibrary {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    pub fn set_playlist(&self, playlist: Playlist, items: Vec<PlaylistItem>) {
        let mut playlists = self.playlists.lock().unwrap();
        playlists.retain(|p| p.id != playlist.id);
        self.tracks
            .lock()
            .unwrap()
            .insert(playlist.id.clone(), items);
        playlists.push(playlist);
    }

    pub fn remove_playlist(&self, playlist_id: &str) {
        self.playlists
            .lock()
            .unwrap()
            .retain(|p| p.id != playlist_id);
    }

    pub fn fail_playlist(&self, playlist_id: &str) {
        self.failing_playlists
            .lock()
            .unwrap()
            .insert(playlist_id.to_string());
    }

    pub fn track_fetch_count(&self) -> usize {
        self.track_fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteLibrary for FakeLibrary {
    async fn current_user(&self, _token: &str) -> Result<CurrentUser, RemoteFetchError> {
        Ok(CurrentUser {
            id: self.user_id.clone(),
            display_name: None,
        })
    }

    async fn user_playlists(
        &self,
        _token: &str,
        _user_id: &str,
    ) -> Result<Vec<Playlist>, RemoteFetchError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(RemoteFetchError::RateLimited {
                retry_after_secs: 600,
            });
        }
        Ok(self.playlists.lock().unwrap().clone())
    }

    async fn playlist_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>, RemoteFetchError> {
        self.track_fetches
            .lock()
            .unwrap()
            .push(playlist_id.to_string());
        if self.failing_playlists.lock().unwrap().contains(playlist_id) {
            return Err(RemoteFetchError::RateLimited {
                retry_after_secs: 600,
            });
        }
        Ok(self
            .tracks
            .lock()
            .unwrap()
            .get(playlist_id)
            .cloned()
            .unwrap_or_default())
    }
}
