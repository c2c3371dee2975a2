use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Token pair as kept in a session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    /// Unix timestamp (seconds) after which the access token is invalid.
    pub expires_at: i64,
}

impl Token {
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<&str>,
        now: i64,
    ) -> Self {
        Token {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            scope: response.scope.unwrap_or_default(),
            expires_at: now + response.expires_in as i64,
        }
    }
}

/// Body returned by the provider's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// One page of a provider collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<Option<T>>,
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistOwner {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: PlaylistOwner,
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub is_local: bool,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub album: Option<Album>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub release_date_precision: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
}

/// Local playlist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub owner_id: String,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub id: String,
    pub name: String,
    pub artist_id: Option<String>,
    /// ISO date (`YYYY-MM-DD`), month and year precision pinned to the first day.
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub name: String,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Everything a re-fetched playlist contributes to the store, written in one transaction.
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub playlist: PlaylistRecord,
    pub artists: Vec<ArtistRecord>,
    pub albums: Vec<AlbumRecord>,
    pub tracks: Vec<TrackRecord>,
    /// `(track_id, occurrences)`, one entry per distinct track.
    pub occurrences: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn merge(&mut self, other: UpsertCounts) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub playlist_id: String,
    pub playlist_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub user_id: String,
    pub playlists_seen: u32,
    pub playlists_synced: u32,
    pub playlists_unchanged: u32,
    pub playlists_removed: u32,
    pub entities: UpsertCounts,
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[serde(alias = "tracks")]
    #[value(alias = "tracks")]
    Track,
    #[serde(alias = "albums")]
    #[value(alias = "albums")]
    Album,
    #[serde(alias = "artists")]
    #[value(alias = "artists")]
    Artist,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Track => write!(f, "track"),
            EntityKind::Album => write!(f, "album"),
            EntityKind::Artist => write!(f, "artist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub external_id: String,
    pub name: String,
    pub occurrences: u32,
}

#[derive(Tabled)]
pub struct RankedTableRow {
    pub rank: usize,
    pub name: String,
    pub occurrences: u32,
    pub id: String,
}

/// One exported row per track of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub playlist_name: String,
    pub track_name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub album_release_date: Option<String>,
    pub playlist_spotify_id: String,
    pub track_spotify_id: String,
    pub artist_spotify_id: Option<String>,
    pub album_spotify_id: Option<String>,
    pub occurrences: u32,
}
