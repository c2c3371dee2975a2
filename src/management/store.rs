use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::debug;

use super::{
    schema,
    session::{SessionId, SessionRecord, TokenStore},
};
use crate::{
    error::PersistenceError,
    types::{
        AlbumRecord, ArtistRecord, EntityKind, ExportRow, PlaylistRecord, PlaylistSnapshot,
        RankedEntity, SyncFailure, TrackRecord, UpsertCounts, UpsertOutcome,
    },
};

/// SQLite-backed persistence for synced library data and sessions.
///
/// The connection is guarded by a mutex that is only ever held for the
/// duration of a single synchronous call.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening database at {:?}", path);
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        schema::ensure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::Poisoned)
    }

    pub fn ensure_user(&self, user_id: &str) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "INSERT INTO users (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
            params![user_id],
        )?;
        Ok(())
    }

    /// Timestamp of the last finished sync pass, `None` if the user never synced.
    pub fn user_last_synced_at(&self, user_id: &str) -> Result<Option<i64>, PersistenceError> {
        let synced_at = self
            .conn()?
            .query_row(
                "SELECT last_synced_at FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(synced_at.flatten())
    }

    pub fn mark_user_synced(&self, user_id: &str, at: i64) -> Result<(), PersistenceError> {
        self.conn()?.execute(
            "UPDATE users SET last_synced_at = ?2 WHERE id = ?1",
            params![user_id, at],
        )?;
        Ok(())
    }

    /// Remote revision recorded at the last successful fetch of the playlist.
    pub fn stored_snapshot_id(
        &self,
        playlist_id: &str,
    ) -> Result<Option<String>, PersistenceError> {
        let snapshot = self
            .conn()?
            .query_row(
                "SELECT snapshot_id FROM playlists WHERE id = ?1",
                params![playlist_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(snapshot.flatten())
    }

    /// Number of committed playlists of the user.
    pub fn playlist_count(&self, user_id: &str) -> Result<i64, PersistenceError> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM playlists WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn playlists_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PlaylistRecord>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, owner_id, snapshot_id FROM playlists \
             WHERE user_id = ?1 ORDER BY name, id",
        )?;
        let playlists = stmt
            .query_map(params![user_id], |row| {
                Ok(PlaylistRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    owner_id: row.get(3)?,
                    snapshot_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    /// Writes a re-fetched playlist with all its entities and replaces its
    /// occurrence rows. Earlier failures recorded for the playlist are
    /// cleared. Everything commits or rolls back together.
    pub fn apply_playlist_snapshot(
        &self,
        snapshot: &PlaylistSnapshot,
    ) -> Result<UpsertCounts, PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut counts = UpsertCounts::default();

        upsert_playlist(&tx, &snapshot.playlist)?;
        for artist in &snapshot.artists {
            counts.record(upsert_artist(&tx, artist)?);
        }
        for album in &snapshot.albums {
            counts.record(upsert_album(&tx, album)?);
        }
        for track in &snapshot.tracks {
            counts.record(upsert_track(&tx, track)?);
        }

        tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1",
            params![snapshot.playlist.id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_tracks (playlist_id, track_id, occurrences) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for (track_id, occurrences) in &snapshot.occurrences {
                insert.execute(params![snapshot.playlist.id, track_id, occurrences])?;
            }
        }

        tx.execute(
            "DELETE FROM sync_failures WHERE user_id = ?1 AND playlist_id = ?2",
            params![snapshot.playlist.user_id, snapshot.playlist.id],
        )?;

        tx.commit()?;
        Ok(counts)
    }

    /// Deletes the given playlists of a user together with their occurrences.
    pub fn remove_playlists(
        &self,
        user_id: &str,
        playlist_ids: &[String],
    ) -> Result<u32, PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for playlist_id in playlist_ids {
            removed += tx.execute(
                "DELETE FROM playlists WHERE id = ?1 AND user_id = ?2",
                params![playlist_id, user_id],
            )? as u32;
            tx.execute(
                "DELETE FROM sync_failures WHERE playlist_id = ?1 AND user_id = ?2",
                params![playlist_id, user_id],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Records the latest failure of a playlist, replacing an older one.
    pub fn record_sync_failure(
        &self,
        user_id: &str,
        failure: &SyncFailure,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM sync_failures WHERE user_id = ?1 AND playlist_id = ?2",
            params![user_id, failure.playlist_id],
        )?;
        tx.execute(
            "INSERT INTO sync_failures (user_id, playlist_id, playlist_name, error, failed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                failure.playlist_id,
                failure.playlist_name,
                failure.error,
                Utc::now().timestamp()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn sync_failures_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SyncFailure>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT playlist_id, playlist_name, error FROM sync_failures \
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let failures = stmt
            .query_map(params![user_id], |row| {
                Ok(SyncFailure {
                    playlist_id: row.get(0)?,
                    playlist_name: row.get(1)?,
                    error: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(failures)
    }

    pub fn tracks_for_playlist(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<TrackRecord>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.album_id, t.artist_id, t.duration_ms \
             FROM playlist_tracks pt JOIN tracks t ON t.id = pt.track_id \
             WHERE pt.playlist_id = ?1 ORDER BY t.name, t.id",
        )?;
        let tracks = stmt
            .query_map(params![playlist_id], |row| {
                Ok(TrackRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    album_id: row.get(2)?,
                    artist_id: row.get(3)?,
                    duration_ms: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Row count of one of the schema's tables.
    pub fn count_rows(&self, table: &str) -> Result<i64, PersistenceError> {
        if !schema::TABLES.iter().any(|t| t.name == table) {
            return Err(PersistenceError::Sqlite(rusqlite::Error::InvalidParameterName(
                table.to_string(),
            )));
        }
        let count = self
            .conn()?
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Occurrence totals over all playlists of the user, highest first, ties
    /// by external id ascending.
    pub fn top_entities(
        &self,
        kind: EntityKind,
        limit: usize,
        user_id: &str,
    ) -> Result<Vec<RankedEntity>, PersistenceError> {
        let (table, join) = match kind {
            EntityKind::Track => ("tracks", "e.id = pt.track_id"),
            EntityKind::Album => ("albums", "e.id = t.album_id"),
            EntityKind::Artist => ("artists", "e.id = t.artist_id"),
        };
        let sql = format!(
            "SELECT e.id, e.name, SUM(pt.occurrences) AS freq \
             FROM playlist_tracks pt \
             JOIN playlists p ON p.id = pt.playlist_id \
             JOIN tracks t ON t.id = pt.track_id \
             JOIN {table} e ON {join} \
             WHERE p.user_id = ?1 \
             GROUP BY e.id, e.name \
             ORDER BY freq DESC, e.id ASC \
             LIMIT ?2"
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ranked = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(RankedEntity {
                    external_id: row.get(0)?,
                    name: row.get(1)?,
                    occurrences: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ranked)
    }

    pub fn export_rows(&self, user_id: &str) -> Result<Vec<ExportRow>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.name, t.name, ar.name, al.name, al.release_date, \
                    p.id, t.id, ar.id, al.id, pt.occurrences \
             FROM playlist_tracks pt \
             JOIN playlists p ON p.id = pt.playlist_id \
             JOIN tracks t ON t.id = pt.track_id \
             LEFT JOIN artists ar ON ar.id = t.artist_id \
             LEFT JOIN albums al ON al.id = t.album_id \
             WHERE p.user_id = ?1 \
             ORDER BY p.name, p.id, t.name, t.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ExportRow {
                    playlist_name: row.get(0)?,
                    track_name: row.get(1)?,
                    artist_name: row.get(2)?,
                    album_name: row.get(3)?,
                    album_release_date: row.get(4)?,
                    playlist_spotify_id: row.get(5)?,
                    track_spotify_id: row.get(6)?,
                    artist_spotify_id: row.get(7)?,
                    album_spotify_id: row.get(8)?,
                    occurrences: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl TokenStore for SqliteStore {
    fn get(&self, session: &SessionId) -> Result<Option<SessionRecord>, PersistenceError> {
        let raw = self
            .conn()?
            .query_row(
                "SELECT record FROM sessions WHERE id = ?1",
                params![session.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            // An unreadable record is treated like no session at all.
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    fn set(&self, session: &SessionId, record: &SessionRecord) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(record).map_err(|e| {
            PersistenceError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })?;
        self.conn()?.execute(
            "INSERT INTO sessions (id, record, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET record = excluded.record, \
             updated_at = excluded.updated_at",
            params![session.as_str(), raw, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn clear(&self, session: &SessionId) -> Result<(), PersistenceError> {
        self.conn()?
            .execute("DELETE FROM sessions WHERE id = ?1", params![session.as_str()])?;
        Ok(())
    }
}

fn row_exists(tx: &Transaction<'_>, table: &str, id: &str) -> Result<bool, PersistenceError> {
    let found = tx
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn outcome(existed: bool, changed: usize) -> UpsertOutcome {
    match (existed, changed) {
        (false, _) => UpsertOutcome::Inserted,
        (true, 0) => UpsertOutcome::Unchanged,
        (true, _) => UpsertOutcome::Updated,
    }
}

fn upsert_playlist(
    tx: &Transaction<'_>,
    playlist: &PlaylistRecord,
) -> Result<(), PersistenceError> {
    tx.execute(
        "INSERT INTO playlists (id, user_id, name, owner_id, snapshot_id, synced_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, name = excluded.name, \
         owner_id = excluded.owner_id, snapshot_id = excluded.snapshot_id, \
         synced_at = excluded.synced_at",
        params![
            playlist.id,
            playlist.user_id,
            playlist.name,
            playlist.owner_id,
            playlist.snapshot_id,
            Utc::now().timestamp()
        ],
    )?;
    Ok(())
}

fn upsert_artist(
    tx: &Transaction<'_>,
    artist: &ArtistRecord,
) -> Result<UpsertOutcome, PersistenceError> {
    let existed = row_exists(tx, "artists", &artist.id)?;
    let changed = tx.execute(
        "INSERT INTO artists (id, name) VALUES (?1, ?2) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name \
         WHERE artists.name IS NOT excluded.name",
        params![artist.id, artist.name],
    )?;
    Ok(outcome(existed, changed))
}

fn upsert_album(
    tx: &Transaction<'_>,
    album: &AlbumRecord,
) -> Result<UpsertOutcome, PersistenceError> {
    let existed = row_exists(tx, "albums", &album.id)?;
    let changed = tx.execute(
        "INSERT INTO albums (id, name, artist_id, release_date) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, artist_id = excluded.artist_id, \
         release_date = excluded.release_date \
         WHERE albums.name IS NOT excluded.name \
            OR albums.artist_id IS NOT excluded.artist_id \
            OR albums.release_date IS NOT excluded.release_date",
        params![album.id, album.name, album.artist_id, album.release_date],
    )?;
    Ok(outcome(existed, changed))
}

fn upsert_track(
    tx: &Transaction<'_>,
    track: &TrackRecord,
) -> Result<UpsertOutcome, PersistenceError> {
    let existed = row_exists(tx, "tracks", &track.id)?;
    let changed = tx.execute(
        "INSERT INTO tracks (id, name, album_id, artist_id, duration_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, album_id = excluded.album_id, \
         artist_id = excluded.artist_id, duration_ms = excluded.duration_ms \
         WHERE tracks.name IS NOT excluded.name \
            OR tracks.album_id IS NOT excluded.album_id \
            OR tracks.artist_id IS NOT excluded.artist_id \
            OR tracks.duration_ms IS NOT excluded.duration_ms",
        params![
            track.id,
            track.name,
            track.album_id,
            track.artist_id,
            track.duration_ms
        ],
    )?;
    Ok(outcome(existed, changed))
}
