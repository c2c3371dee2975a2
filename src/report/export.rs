use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::ensure_synced;
use crate::{error::ReportError, management::SqliteStore, types::ExportRow, utils::csv_field};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

const CSV_HEADER: [&str; 10] = [
    "playlist_name",
    "track_name",
    "artist_name",
    "album_name",
    "album_release_date",
    "playlist_spotify_id",
    "track_spotify_id",
    "artist_spotify_id",
    "album_spotify_id",
    "occurrences",
];

/// Dumps every playlist/track pairing of the user with names and ids.
pub fn export(
    store: &SqliteStore,
    user_id: &str,
    format: ExportFormat,
) -> Result<Vec<u8>, ReportError> {
    ensure_synced(store, user_id)?;
    let rows = store.export_rows(user_id)?;

    match format {
        ExportFormat::Csv => Ok(to_csv(&rows).into_bytes()),
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(&rows)?),
    }
}

fn to_csv(rows: &[ExportRow]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for row in rows {
        let occurrences = row.occurrences.to_string();
        let fields = [
            row.playlist_name.as_str(),
            row.track_name.as_str(),
            row.artist_name.as_deref().unwrap_or_default(),
            row.album_name.as_deref().unwrap_or_default(),
            row.album_release_date.as_deref().unwrap_or_default(),
            row.playlist_spotify_id.as_str(),
            row.track_spotify_id.as_str(),
            row.artist_spotify_id.as_deref().unwrap_or_default(),
            row.album_spotify_id.as_deref().unwrap_or_default(),
            occurrences.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}
