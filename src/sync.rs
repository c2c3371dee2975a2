//! Pulls a user's playlists from the provider into the local store.
//!
//! One pass lists the user's own playlists, re-fetches those whose remote
//! revision changed and commits each of them in its own transaction. A
//! playlist that fails is recorded and skipped, the rest of the pass goes on.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    error::{PersistenceError, RemoteFetchError, SyncError},
    management::{SessionId, SqliteStore},
    spotify::{auth::OAuthSessionManager, client::RemoteLibrary},
    types::{
        AlbumRecord, ArtistRecord, Playlist, PlaylistItem, PlaylistRecord, PlaylistSnapshot,
        SyncFailure, SyncReport, TrackRecord, UpsertCounts,
    },
    utils,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Re-fetch playlists even if their snapshot id did not change.
    pub force: bool,
}

/// External ids already written during the current pass.
#[derive(Debug, Default)]
struct WrittenIds {
    artists: HashSet<String>,
    albums: HashSet<String>,
    tracks: HashSet<String>,
}

impl WrittenIds {
    fn absorb(&mut self, snapshot: &PlaylistSnapshot) {
        self.artists
            .extend(snapshot.artists.iter().map(|a| a.id.clone()));
        self.albums.extend(snapshot.albums.iter().map(|a| a.id.clone()));
        self.tracks.extend(snapshot.tracks.iter().map(|t| t.id.clone()));
    }
}

#[derive(Debug, thiserror::Error)]
enum PlaylistSyncError {
    #[error(transparent)]
    Remote(#[from] RemoteFetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub struct SyncService {
    store: Arc<SqliteStore>,
    remote: Arc<dyn RemoteLibrary>,
    auth: Arc<OAuthSessionManager>,
}

impl SyncService {
    pub fn new(
        store: Arc<SqliteStore>,
        remote: Arc<dyn RemoteLibrary>,
        auth: Arc<OAuthSessionManager>,
    ) -> Self {
        Self {
            store,
            remote,
            auth,
        }
    }

    pub async fn sync_user_library(
        &self,
        session: &SessionId,
        user_id: &str,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let token = self.auth.get_valid_token(session).await?;
        self.store.ensure_user(user_id)?;

        let playlists: Vec<Playlist> = self
            .remote
            .user_playlists(&token, user_id)
            .await?
            .into_iter()
            .filter(|p| p.owner.id == user_id)
            .collect();

        info!(
            user_id,
            playlists = playlists.len(),
            force = options.force,
            "Starting library sync"
        );

        let mut report = SyncReport {
            user_id: user_id.to_string(),
            playlists_seen: playlists.len() as u32,
            ..Default::default()
        };
        let mut written = WrittenIds::default();

        for playlist in &playlists {
            let stored_snapshot = match self.store.stored_snapshot_id(&playlist.id) {
                Ok(stored) => stored,
                Err(e) => {
                    let error = PlaylistSyncError::from(e);
                    self.record_failure(user_id, playlist, &error, &mut report)?;
                    continue;
                }
            };
            if !options.force
                && playlist.snapshot_id.is_some()
                && stored_snapshot == playlist.snapshot_id
            {
                debug!(playlist_id = %playlist.id, "Snapshot unchanged, skipping");
                report.playlists_unchanged += 1;
                continue;
            }

            // the token may expire during a long pass
            let token = self.auth.get_valid_token(session).await?;

            match self.sync_playlist(&token, user_id, playlist, &mut written).await {
                Ok(counts) => {
                    report.playlists_synced += 1;
                    report.entities.merge(counts);
                }
                Err(e) => self.record_failure(user_id, playlist, &e, &mut report)?,
            }
        }

        let remote_ids: HashSet<&str> = playlists.iter().map(|p| p.id.as_str()).collect();
        let stale: Vec<String> = self
            .store
            .playlists_for_user(user_id)?
            .into_iter()
            .map(|p| p.id)
            .filter(|id| !remote_ids.contains(id.as_str()))
            .collect();
        if !stale.is_empty() {
            report.playlists_removed = self.store.remove_playlists(user_id, &stale)?;
        }

        self.store.mark_user_synced(user_id, Utc::now().timestamp())?;

        info!(
            user_id,
            synced = report.playlists_synced,
            unchanged = report.playlists_unchanged,
            removed = report.playlists_removed,
            failed = report.failures.len(),
            "Library sync finished"
        );
        Ok(report)
    }

    fn record_failure(
        &self,
        user_id: &str,
        playlist: &Playlist,
        error: &PlaylistSyncError,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        warn!(playlist_id = %playlist.id, "Playlist sync failed: {}", error);
        let failure = SyncFailure {
            playlist_id: playlist.id.clone(),
            playlist_name: playlist.name.clone(),
            error: error.to_string(),
        };
        self.store.record_sync_failure(user_id, &failure)?;
        report.failures.push(failure);
        Ok(())
    }

    async fn sync_playlist(
        &self,
        token: &str,
        user_id: &str,
        playlist: &Playlist,
        written: &mut WrittenIds,
    ) -> Result<UpsertCounts, PlaylistSyncError> {
        let items = self.remote.playlist_tracks(token, &playlist.id).await?;
        let snapshot = build_snapshot(user_id, playlist, &items, written);
        let counts = self.store.apply_playlist_snapshot(&snapshot)?;
        written.absorb(&snapshot);

        debug!(
            playlist_id = %playlist.id,
            tracks = snapshot.occurrences.len(),
            "Playlist committed"
        );
        Ok(counts)
    }
}

/// Turns fetched playlist items into the rows to write.
///
/// Local files and items without a track id are skipped. Only the first
/// listed artist of a track or album is kept. Entities already written
/// earlier in the pass are left out, occurrences always cover every track.
fn build_snapshot(
    user_id: &str,
    playlist: &Playlist,
    items: &[PlaylistItem],
    written: &WrittenIds,
) -> PlaylistSnapshot {
    let mut snapshot = PlaylistSnapshot {
        playlist: PlaylistRecord {
            id: playlist.id.clone(),
            user_id: user_id.to_string(),
            name: playlist.name.clone(),
            owner_id: playlist.owner.id.clone(),
            snapshot_id: playlist.snapshot_id.clone(),
        },
        artists: Vec::new(),
        albums: Vec::new(),
        tracks: Vec::new(),
        occurrences: Vec::new(),
    };

    let mut artist_ids = HashSet::new();
    let mut album_ids = HashSet::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut add_artist = |snapshot: &mut PlaylistSnapshot, id: &str, name: &str| {
        if !written.artists.contains(id) && artist_ids.insert(id.to_string()) {
            snapshot.artists.push(ArtistRecord {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
    };

    for item in items {
        if item.is_local {
            continue;
        }
        let Some(track) = &item.track else { continue };
        let Some(track_id) = &track.id else { continue };

        if let Some(&index) = positions.get(track_id) {
            snapshot.occurrences[index].1 += 1;
            continue;
        }
        positions.insert(track_id.clone(), snapshot.occurrences.len());
        snapshot.occurrences.push((track_id.clone(), 1));

        let track_artist = track
            .artists
            .first()
            .and_then(|a| a.id.as_deref().map(|id| (id, a.name.as_str())));
        if let Some((id, name)) = track_artist {
            add_artist(&mut snapshot, id, name);
        }

        let album_id = track.album.as_ref().and_then(|album| {
            let id = album.id.as_deref()?;
            let album_artist = album
                .artists
                .first()
                .and_then(|a| a.id.as_deref().map(|id| (id, a.name.as_str())))
                .or(track_artist);
            if let Some((artist_id, artist_name)) = album_artist {
                add_artist(&mut snapshot, artist_id, artist_name);
            }

            if !written.albums.contains(id) && album_ids.insert(id.to_string()) {
                snapshot.albums.push(AlbumRecord {
                    id: id.to_string(),
                    name: album.name.clone(),
                    artist_id: album_artist.map(|(artist_id, _)| artist_id.to_string()),
                    release_date: utils::normalize_release_date(
                        album.release_date.as_deref(),
                        album.release_date_precision.as_deref(),
                    ),
                });
            }
            Some(id.to_string())
        });

        if !written.tracks.contains(track_id) {
            snapshot.tracks.push(TrackRecord {
                id: track_id.clone(),
                name: track.name.clone(),
                album_id,
                artist_id: track_artist.map(|(id, _)| id.to_string()),
                duration_ms: track.duration_ms.map(|ms| ms as i64),
            });
        }
    }

    snapshot
}
