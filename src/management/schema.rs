use rusqlite::Connection;
use tracing::info;

use crate::error::PersistenceError;

pub const SCHEMA_VERSION: usize = 1;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

pub struct Table {
    pub name: &'static str,
    pub columns: &'static str,
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    fn create(&self, conn: &Connection) -> Result<(), PersistenceError> {
        let columns = self.columns.replace("{DEFAULT_TIMESTAMP}", DEFAULT_TIMESTAMP);
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {} ({});", self.name, columns),
            [],
        )?;
        for (index_name, column_names) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                    index_name, self.name, column_names
                ),
                [],
            )?;
        }
        Ok(())
    }
}

pub const TABLES: &[Table] = &[
    Table {
        name: "users",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  created_at INTEGER NOT NULL DEFAULT {DEFAULT_TIMESTAMP}, \
                  last_synced_at INTEGER",
        indices: &[],
    },
    Table {
        name: "sessions",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  record TEXT NOT NULL, \
                  updated_at INTEGER NOT NULL DEFAULT {DEFAULT_TIMESTAMP}",
        indices: &[],
    },
    Table {
        name: "playlists",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE, \
                  name TEXT NOT NULL, \
                  owner_id TEXT NOT NULL, \
                  snapshot_id TEXT, \
                  synced_at INTEGER NOT NULL DEFAULT {DEFAULT_TIMESTAMP}",
        indices: &[("idx_playlists_user", "user_id")],
    },
    Table {
        name: "artists",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  name TEXT NOT NULL",
        indices: &[],
    },
    Table {
        name: "albums",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  name TEXT NOT NULL, \
                  artist_id TEXT REFERENCES artists(id) ON DELETE SET NULL, \
                  release_date TEXT",
        indices: &[],
    },
    Table {
        name: "tracks",
        columns: "id TEXT PRIMARY KEY NOT NULL, \
                  name TEXT NOT NULL, \
                  album_id TEXT REFERENCES albums(id) ON DELETE SET NULL, \
                  artist_id TEXT REFERENCES artists(id) ON DELETE SET NULL, \
                  duration_ms INTEGER",
        indices: &[
            ("idx_tracks_album", "album_id"),
            ("idx_tracks_artist", "artist_id"),
        ],
    },
    Table {
        name: "playlist_tracks",
        columns: "playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE, \
                  track_id TEXT NOT NULL REFERENCES tracks(id), \
                  occurrences INTEGER NOT NULL, \
                  PRIMARY KEY (playlist_id, track_id)",
        indices: &[("idx_playlist_tracks_track", "track_id")],
    },
    Table {
        name: "sync_failures",
        columns: "id INTEGER PRIMARY KEY AUTOINCREMENT, \
                  user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE, \
                  playlist_id TEXT NOT NULL, \
                  playlist_name TEXT NOT NULL, \
                  error TEXT NOT NULL, \
                  failed_at INTEGER NOT NULL DEFAULT {DEFAULT_TIMESTAMP}",
        indices: &[("idx_sync_failures_user", "user_id")],
    },
];

/// Creates missing tables and stamps the schema version.
///
/// A database written by a newer version is refused instead of being
/// silently downgraded.
pub fn ensure(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let found = found.max(0) as usize;
    if found > SCHEMA_VERSION {
        return Err(PersistenceError::SchemaVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for table in TABLES {
        table.create(conn)?;
    }

    if found < SCHEMA_VERSION {
        info!("Initialized database schema version {}", SCHEMA_VERSION);
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }
    Ok(())
}
