use std::fs;
use std::path::Path;

use common::{LedgerRow, LedgerTimestamp, TrackRecord};
use library::ledger;
use library::{reconcile_directory, ReconcileOptions};

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), name.as_bytes()).unwrap();
}

fn row(id: &str, timestamp: &str, artist: &str, title: &str, filename: &str) -> LedgerRow {
    LedgerRow {
        remote_id: id.to_string(),
        timestamp: LedgerTimestamp::parse(timestamp),
        artist: artist.to_string(),
        title: title.to_string(),
        filename: filename.to_string(),
    }
}

fn playlist() -> Vec<TrackRecord> {
    vec![
        TrackRecord::new("1", "A", "x"),
        TrackRecord::new("2", "B", "y"),
        TrackRecord::new("3", "C", "z"),
    ]
}

#[test]
fn first_pass_tracks_and_promotes_then_settles() {
    let dir = tempfile::TempDir::new().unwrap();
    for name in ["A - x.mp3", "B - y_1.mp3", "C - z_1.mp3", "C - z_2.mp3"] {
        touch(dir.path(), name);
    }
    let records = playlist();
    let options = ReconcileOptions::default();

    let first = reconcile_directory(dir.path(), &records, &options).unwrap();
    assert_eq!(first.ids.added, 1);
    assert_eq!(first.restricted.len(), 2);
    assert_eq!(first.promotion.renamed.len(), 1);
    assert_eq!(first.promotion.ambiguous, vec!["C - z.mp3".to_string()]);
    assert!(first.changed_anything());

    assert!(dir.path().join("B - y.mp3").is_file());
    assert!(!dir.path().join("B - y_1.mp3").exists());
    assert!(dir.path().join("C - z_1.mp3").is_file());
    assert!(dir.path().join("C - z_2.mp3").is_file());

    let rows = ledger::read(dir.path()).unwrap();
    let filenames: Vec<&str> = rows.iter().map(|row| row.filename.as_str()).collect();
    assert_eq!(filenames, vec!["A - x.mp3", "B - y.mp3", "C - z_1.mp3"]);

    let before = fs::read(ledger::ledger_path(dir.path())).unwrap();
    let second = reconcile_directory(dir.path(), &records, &options).unwrap();
    assert!(!second.changed_anything());
    assert_eq!(second.cleanup.kept, 3);
    assert_eq!(second.promotion.ambiguous, vec!["C - z.mp3".to_string()]);
    let after = fs::read(ledger::ledger_path(dir.path())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn existing_rows_keep_their_history() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(dir.path(), "A - x.mp3");
    touch(dir.path(), "Gone From Playlist - q.mp3");
    let mut rows = vec![
        row("1", "2020-05-05 10:00:00", "A", "x", "A - x.mp3"),
        row("9", "2019-01-01 00:00:00", "Gone From Playlist", "q", "Gone From Playlist - q.mp3"),
    ];
    ledger::write(dir.path(), &mut rows).unwrap();
    let before = fs::read(ledger::ledger_path(dir.path())).unwrap();

    let report = reconcile_directory(dir.path(), &playlist(), &ReconcileOptions::default()).unwrap();
    assert!(report.restricted.is_empty());
    assert!(!report.changed_anything());
    let after = fs::read(ledger::ledger_path(dir.path())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn stale_id_is_followed_and_orphans_dropped() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(dir.path(), "A - x.mp3");
    let mut rows = vec![
        row("old", "2020-05-05 10:00:00", "A", "x", "A - x.mp3"),
        row("7", "2020-05-05 10:00:00", "Deleted", "w", "Deleted - w.mp3"),
    ];
    ledger::write(dir.path(), &mut rows).unwrap();

    let report = reconcile_directory(dir.path(), &playlist(), &ReconcileOptions::default()).unwrap();
    assert_eq!(report.cleanup.dropped_orphans, 1);
    assert_eq!(report.ids.flipped, 1);

    let rows = ledger::read(dir.path()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].remote_id, "1");
}

#[test]
fn restricted_update_can_be_disabled() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(dir.path(), "B - y_1.mp3");
    let options = ReconcileOptions {
        restricted_update: false,
    };

    let report = reconcile_directory(dir.path(), &playlist(), &options).unwrap();
    assert!(report.restricted.is_empty());
    assert_eq!(report.promotion.renamed.len(), 1);
    assert!(ledger::read(dir.path()).unwrap().is_empty());
}

#[test]
fn numbered_name_of_another_record_is_tracked_once() {
    let dir = tempfile::TempDir::new().unwrap();
    touch(dir.path(), "A - B_2.mp3");
    let records = vec![TrackRecord::new("1", "A", "B"), TrackRecord::new("2", "A", "B_2")];
    let options = ReconcileOptions::default();

    let first = reconcile_directory(dir.path(), &records, &options).unwrap();
    assert_eq!(first.ids.added, 1);
    assert!(first.restricted.is_empty());
    assert!(first.promotion.renamed.is_empty());
    let rows = ledger::read(dir.path()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].remote_id, "2");
    assert_eq!(rows[0].filename, "A - B_2.mp3");

    let before = fs::read(ledger::ledger_path(dir.path())).unwrap();
    for _ in 0..2 {
        let again = reconcile_directory(dir.path(), &records, &options).unwrap();
        assert!(!again.changed_anything());
        assert_eq!(again.ids.deduped, 0);
        assert_eq!(fs::read(ledger::ledger_path(dir.path())).unwrap(), before);
    }
    assert!(dir.path().join("A - B_2.mp3").is_file());
    assert!(!dir.path().join("A - B.mp3").exists());
}
