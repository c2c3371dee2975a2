mod common;

use common::create_tmp_store;
use spotstats::{
    error::ReportError,
    management::SqliteStore,
    report::{self, ExportFormat},
    types::{
        AlbumRecord, ArtistRecord, EntityKind, ExportRow, PlaylistRecord, PlaylistSnapshot,
        TrackRecord,
    },
};

const USER: &str = "user1";

fn artist(id: &str) -> ArtistRecord {
    ArtistRecord {
        id: id.to_string(),
        name: format!("Artist {id}"),
    }
}

fn album(id: &str, artist_id: &str) -> AlbumRecord {
    AlbumRecord {
        id: id.to_string(),
        name: format!("Album {id}"),
        artist_id: Some(artist_id.to_string()),
        release_date: Some("2019-03-01".to_string()),
    }
}

fn track(id: &str, album_id: &str, artist_id: &str) -> TrackRecord {
    TrackRecord {
        id: id.to_string(),
        name: format!("Track {id}"),
        album_id: Some(album_id.to_string()),
        artist_id: Some(artist_id.to_string()),
        duration_ms: Some(1000),
    }
}

fn snapshot(playlist_id: &str, occurrences: &[(&str, u32)]) -> PlaylistSnapshot {
    PlaylistSnapshot {
        playlist: PlaylistRecord {
            id: playlist_id.to_string(),
            user_id: USER.to_string(),
            name: format!("Playlist {playlist_id}"),
            owner_id: USER.to_string(),
            snapshot_id: Some("s".to_string()),
        },
        artists: vec![artist("ar-a"), artist("ar-b")],
        albums: vec![album("al-x", "ar-a"), album("al-y", "ar-b")],
        tracks: vec![
            track("t-c", "al-x", "ar-a"),
            track("t-a", "al-x", "ar-a"),
            track("t-b", "al-y", "ar-b"),
            track("t-d", "al-y", "ar-b"),
        ],
        occurrences: occurrences
            .iter()
            .map(|(id, count)| (id.to_string(), *count))
            .collect(),
    }
}

/// Track totals: t-a 3, t-b 3, t-c 3, t-d 1.
fn seeded_store() -> (std::sync::Arc<SqliteStore>, tempfile::TempDir) {
    let (store, temp_dir) = create_tmp_store();
    store.ensure_user(USER).unwrap();
    store
        .apply_playlist_snapshot(&snapshot("pl1", &[("t-c", 2), ("t-a", 1), ("t-b", 3)]))
        .unwrap();
    store
        .apply_playlist_snapshot(&snapshot("pl2", &[("t-a", 2), ("t-c", 1), ("t-d", 1)]))
        .unwrap();
    store.mark_user_synced(USER, 1_700_000_000).unwrap();
    (store, temp_dir)
}

#[test]
fn test_top_tracks_sorted_with_ties_by_id() {
    let (store, _temp_dir) = seeded_store();

    let top = report::top_n(&store, EntityKind::Track, 3, USER).unwrap();
    let ids: Vec<_> = top.iter().map(|e| e.external_id.as_str()).collect();
    assert_eq!(ids, vec!["t-a", "t-b", "t-c"]);
    assert!(top.windows(2).all(|w| w[0].occurrences >= w[1].occurrences));
    assert!(top.iter().all(|e| e.occurrences == 3));

    let all = report::top_n(&store, EntityKind::Track, 50, USER).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[3].external_id, "t-d");
}

#[test]
fn test_top_albums_and_artists_sum_track_occurrences() {
    let (store, _temp_dir) = seeded_store();

    let albums = report::top_n(&store, EntityKind::Album, 5, USER).unwrap();
    assert_eq!(albums[0].external_id, "al-x");
    assert_eq!(albums[0].occurrences, 6);
    assert_eq!(albums[1].external_id, "al-y");
    assert_eq!(albums[1].occurrences, 4);

    let artists = report::top_n(&store, EntityKind::Artist, 1, USER).unwrap();
    assert_eq!(artists.len(), 1);
    assert_eq!(artists[0].external_id, "ar-a");
    assert_eq!(artists[0].name, "Artist ar-a");
}

#[test]
fn test_top_zero_is_empty() {
    let (store, _temp_dir) = seeded_store();
    assert!(
        report::top_n(&store, EntityKind::Track, 0, USER)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_never_synced_user_has_no_data() {
    let (store, _temp_dir) = seeded_store();

    let err = report::top_n(&store, EntityKind::Track, 3, "stranger").unwrap_err();
    assert!(matches!(err, ReportError::NoData(ref e) if e.user_id == "stranger"));

    let err = report::export(&store, "stranger", ExportFormat::Csv).unwrap_err();
    assert!(matches!(err, ReportError::NoData(_)));
}

#[test]
fn test_reports_are_scoped_per_user() {
    let (store, _temp_dir) = seeded_store();
    store.ensure_user("user2").unwrap();

    // synced, but nothing committed yet
    store.mark_user_synced("user2", 1_700_000_000).unwrap();
    assert!(matches!(
        report::top_n(&store, EntityKind::Track, 10, "user2"),
        Err(ReportError::NoData(_))
    ));

    let mut other = snapshot("pl3", &[("t-d", 5)]);
    other.playlist.user_id = "user2".to_string();
    other.playlist.owner_id = "user2".to_string();
    store.apply_playlist_snapshot(&other).unwrap();

    let top = report::top_n(&store, EntityKind::Track, 10, "user2").unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].external_id, "t-d");
    assert_eq!(top[0].occurrences, 5);

    // user1 still sees only their own playlists
    let top = report::top_n(&store, EntityKind::Track, 1, USER).unwrap();
    assert_eq!(top[0].occurrences, 3);
}

#[test]
fn test_export_json_rows() {
    let (store, _temp_dir) = seeded_store();

    let body = report::export(&store, USER, ExportFormat::Json).unwrap();
    let rows: Vec<ExportRow> = serde_json::from_slice(&body).unwrap();
    assert_eq!(rows.len(), 6);

    let row = rows
        .iter()
        .find(|r| r.playlist_spotify_id == "pl1" && r.track_spotify_id == "t-b")
        .unwrap();
    assert_eq!(row.occurrences, 3);
    assert_eq!(row.artist_spotify_id.as_deref(), Some("ar-b"));
    assert_eq!(row.album_spotify_id.as_deref(), Some("al-y"));
    assert_eq!(row.album_release_date.as_deref(), Some("2019-03-01"));
}

#[test]
fn test_export_csv() {
    let (store, _temp_dir) = seeded_store();

    let body = report::export(&store, USER, ExportFormat::Csv).unwrap();
    let csv = String::from_utf8(body).unwrap();
    let lines: Vec<_> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "playlist_name,track_name,artist_name,album_name,album_release_date,\
         playlist_spotify_id,track_spotify_id,artist_spotify_id,album_spotify_id,occurrences"
    );
    assert_eq!(lines.len(), 7);
    assert_eq!(
        lines[1],
        "Playlist pl1,Track t-a,Artist ar-a,Album al-x,2019-03-01,pl1,t-a,ar-a,al-x,1"
    );
}

#[test]
fn test_chart_for_top_entries() {
    let (store, _temp_dir) = seeded_store();
    let top = report::top_n(&store, EntityKind::Track, 4, USER).unwrap();

    let png = report::render_bar_chart(&top, &report::ChartOptions::default()).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}
