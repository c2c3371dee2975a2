mod common;

use std::sync::Arc;

use common::{
    FakeLibrary, FakeTokenEndpoint, create_tmp_store, manager_with, playlist, store_token, track,
};
use spotstats::{
    error::{AuthError, ReportError, SyncError},
    management::{MemoryTokenStore, SessionId, SqliteStore},
    report::{self, ExportFormat},
    sync::{SyncOptions, SyncService},
    types::EntityKind,
};
use tempfile::TempDir;

const USER: &str = "user1";

struct Fixture {
    store: Arc<SqliteStore>,
    library: Arc<FakeLibrary>,
    service: SyncService,
    session: SessionId,
    temp_dir: TempDir,
}

fn fixture() -> Fixture {
    let (store, temp_dir) = create_tmp_store();
    let sessions = Arc::new(MemoryTokenStore::new());
    let session = SessionId::generate();
    store_token(sessions.as_ref(), &session, 3600);

    let auth = Arc::new(manager_with(sessions, Arc::new(FakeTokenEndpoint::default())));
    let library = Arc::new(FakeLibrary::new(USER));
    let service = SyncService::new(store.clone(), library.clone(), auth);

    Fixture {
        store,
        library,
        service,
        session,
        temp_dir,
    }
}

fn row_counts(store: &SqliteStore) -> Vec<i64> {
    ["users", "playlists", "artists", "albums", "tracks", "playlist_tracks"]
        .iter()
        .map(|table| store.count_rows(table).unwrap())
        .collect()
}

fn seed_three_playlists(library: &FakeLibrary) {
    library.set_playlist(
        playlist("pl1", USER, "a"),
        vec![track("t1", "ar1", "al1"), track("t2", "ar1", "al1"), track("t1", "ar1", "al1")],
    );
    library.set_playlist(
        playlist("pl2", USER, "a"),
        vec![track("t1", "ar1", "al1"), track("t3", "ar2", "al2")],
    );
    library.set_playlist(playlist("pl3", USER, "a"), vec![track("t4", "ar3", "al3")]);
}

#[tokio::test]
async fn test_second_sync_with_unchanged_data_changes_nothing() {
    let f = fixture();
    seed_three_playlists(&f.library);

    let first = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.playlists_synced, 3);
    assert!(first.failures.is_empty());
    let counts_after_first = row_counts(&f.store);
    assert_eq!(counts_after_first, vec![1, 3, 3, 3, 4, 5]);

    let second = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.playlists_unchanged, 3);
    assert_eq!(second.playlists_synced, 0);
    assert_eq!(second.entities.inserted + second.entities.updated, 0);
    assert_eq!(row_counts(&f.store), counts_after_first);
    // unchanged snapshots are not fetched again
    assert_eq!(f.library.track_fetch_count(), 3);
}

#[tokio::test]
async fn test_forced_sync_refetches_without_duplicates() {
    let f = fixture();
    seed_three_playlists(&f.library);

    f.service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    let counts = row_counts(&f.store);
    let top_before = report::top_n(&f.store, EntityKind::Track, 10, USER).unwrap();

    let forced = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions { force: true })
        .await
        .unwrap();
    assert_eq!(forced.playlists_synced, 3);
    assert_eq!(forced.entities.inserted, 0);
    assert_eq!(forced.entities.updated, 0);
    assert_eq!(f.library.track_fetch_count(), 6);

    // occurrences replaced, not accumulated
    assert_eq!(row_counts(&f.store), counts);
    assert_eq!(
        report::top_n(&f.store, EntityKind::Track, 10, USER).unwrap(),
        top_before
    );
}

#[tokio::test]
async fn test_each_entity_written_once_per_pass() {
    let f = fixture();
    seed_three_playlists(&f.library);

    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();

    // 3 artists + 3 albums + 4 tracks, although t1 sits in two playlists
    assert_eq!(report.entities.inserted, 10);
    assert_eq!(report.entities.updated + report.entities.unchanged, 0);
}

#[tokio::test]
async fn test_failing_playlist_does_not_block_the_others() {
    let f = fixture();
    seed_three_playlists(&f.library);
    f.library.fail_playlist("pl2");

    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.playlists_synced, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].playlist_id, "pl2");
    assert_eq!(f.store.sync_failures_for_user(USER).unwrap(), report.failures);

    assert_eq!(f.store.tracks_for_playlist("pl1").unwrap().len(), 2);
    assert_eq!(f.store.tracks_for_playlist("pl3").unwrap().len(), 1);
    assert!(f.store.tracks_for_playlist("pl2").unwrap().is_empty());

    let top = report::top_n(&f.store, EntityKind::Track, 3, USER).unwrap();
    assert_eq!(top[0].external_id, "t1");
    assert_eq!(top[0].occurrences, 2);

    // the failed playlist is picked up by the next pass
    f.library.failing_playlists.lock().unwrap().clear();
    let retry = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(retry.playlists_synced, 1);
    assert_eq!(retry.playlists_unchanged, 2);
    assert_eq!(f.store.tracks_for_playlist("pl2").unwrap().len(), 2);
    assert!(f.store.sync_failures_for_user(USER).unwrap().is_empty());
}

#[tokio::test]
async fn test_changed_snapshot_replaces_occurrences() {
    let f = fixture();
    seed_three_playlists(&f.library);
    f.service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();

    f.library
        .set_playlist(playlist("pl1", USER, "b"), vec![track("t2", "ar1", "al1")]);
    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.playlists_synced, 1);
    assert_eq!(report.playlists_unchanged, 2);

    let tracks: Vec<_> = f
        .store
        .tracks_for_playlist("pl1")
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(tracks, vec!["t2".to_string()]);
    assert_eq!(f.store.stored_snapshot_id("pl1").unwrap().as_deref(), Some("b"));
}

#[tokio::test]
async fn test_removed_and_foreign_playlists() {
    let f = fixture();
    seed_three_playlists(&f.library);
    f.library.set_playlist(
        playlist("followed", "someone-else", "x"),
        vec![track("t9", "ar9", "al9")],
    );

    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.playlists_seen, 3);
    assert_eq!(f.store.playlists_for_user(USER).unwrap().len(), 3);

    f.library.remove_playlist("pl3");
    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.playlists_removed, 1);
    let ids: Vec<_> = f
        .store
        .playlists_for_user(USER)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert!(!ids.contains(&"pl3".to_string()));
    assert_eq!(f.store.count_rows("playlist_tracks").unwrap(), 4);
}

#[tokio::test]
async fn test_unreadable_stored_playlist_is_recorded_as_failure() {
    let f = fixture();
    seed_three_playlists(&f.library);

    // pl2 already exists for another user with a snapshot id that cannot be read back
    let conn = rusqlite::Connection::open(f.temp_dir.path().join("spotstats.db")).unwrap();
    conn.execute_batch(
        "INSERT INTO users (id) VALUES ('other'); \
         INSERT INTO playlists (id, user_id, name, owner_id, snapshot_id) \
         VALUES ('pl2', 'other', 'Foreign', 'other', X'00');",
    )
    .unwrap();
    drop(conn);

    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.playlists_synced, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].playlist_id, "pl2");
    assert_eq!(f.store.sync_failures_for_user(USER).unwrap(), report.failures);
    assert_eq!(f.library.track_fetch_count(), 2);
    assert!(f.store.user_last_synced_at(USER).unwrap().is_some());
}

#[tokio::test]
async fn test_listing_failure_aborts_before_any_write() {
    let f = fixture();
    seed_three_playlists(&f.library);
    *f.library.fail_listing.lock().unwrap() = true;

    let err = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(f.store.count_rows("playlists").unwrap(), 0);
    assert!(f.store.user_last_synced_at(USER).unwrap().is_none());
}

#[tokio::test]
async fn test_sync_without_session_fails_with_auth_error() {
    let f = fixture();
    seed_three_playlists(&f.library);

    let err = f
        .service
        .sync_user_library(&SessionId::generate(), USER, SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Auth(AuthError::NoSession)));
    assert_eq!(f.library.track_fetch_count(), 0);
}

#[tokio::test]
async fn test_sync_marks_user_as_synced() {
    let f = fixture();
    seed_three_playlists(&f.library);
    assert!(matches!(
        report::top_n(&f.store, EntityKind::Artist, 5, USER),
        Err(ReportError::NoData(_))
    ));

    f.service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert!(f.store.user_last_synced_at(USER).unwrap().is_some());
    assert_eq!(
        report::top_n(&f.store, EntityKind::Artist, 5, USER)
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_empty_library_has_no_report_data() {
    let f = fixture();

    f.service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert!(f.store.user_last_synced_at(USER).unwrap().is_some());

    let err = report::top_n(&f.store, EntityKind::Track, 3, USER).unwrap_err();
    assert!(matches!(err, ReportError::NoData(ref e) if e.user_id == USER));
    assert!(matches!(
        report::export(&f.store, USER, ExportFormat::Csv),
        Err(ReportError::NoData(_))
    ));
}

#[tokio::test]
async fn test_all_playlists_failing_leaves_no_report_data() {
    let f = fixture();
    f.library
        .set_playlist(playlist("pl1", USER, "a"), vec![track("t1", "ar1", "al1")]);
    f.library.fail_playlist("pl1");

    let report = f
        .service
        .sync_user_library(&f.session, USER, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.playlists_synced, 0);
    assert_eq!(report.failures.len(), 1);

    assert!(matches!(
        report::top_n(&f.store, EntityKind::Track, 3, USER),
        Err(ReportError::NoData(_))
    ));
}
