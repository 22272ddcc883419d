use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use common::names::canonical_stem;
use common::{normalize, possible_filenames, sanitize, LedgerRow, TrackRecord};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::consolidate::copy_preserving_mtime;
use crate::disk::DiskIndex;
use crate::ledger::{self, LEDGER_FILE_NAME};
use crate::link::{self, clean_playlist_url, is_playlist_url};
use crate::manifest::{self, is_manifest, MANIFEST_EXTENSION};
use crate::promote::expected_filenames;
use crate::source::PlaylistSource;
use crate::LibraryError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub copied: Vec<String>,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlaylistStatus {
    pub total: usize,
    pub downloaded: usize,
    pub in_local_files: Vec<String>,
    pub missing: Vec<String>,
}

pub fn manifest_path(dir: &Path, playlist_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize(playlist_name), MANIFEST_EXTENSION))
}

fn subdirectories(base: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// The directory under `base` mirroring the playlist at `url`.
///
/// A directory whose link file carries the same URL is reused, and renamed to
/// the playlist's current sanitized name when that name is free. Otherwise a
/// new directory is created.
pub fn locate_playlist_dir(base: &Path, url: &str, playlist_name: &str) -> Result<PathBuf, LibraryError> {
    fs::create_dir_all(base)?;
    let wanted_url = clean_playlist_url(url);
    let wanted_name = sanitize(playlist_name);

    let matching = subdirectories(base)?.into_iter().find(|dir| {
        link::read_link(dir)
            .and_then(|link| link.url)
            .is_some_and(|found| clean_playlist_url(&found) == wanted_url)
    });

    match matching {
        Some(dir) => {
            if dir.file_name().is_some_and(|name| name == wanted_name.as_str()) {
                return Ok(dir);
            }
            let target = base.join(&wanted_name);
            if target.exists() {
                return Ok(dir);
            }
            match fs::rename(&dir, &target) {
                Ok(()) => {
                    info!("Playlist directory renamed from {:?} to {:?}", dir, target);
                    Ok(target)
                }
                Err(err) => {
                    warn!("Failed to rename {:?} to {:?}: {}", dir, target, err);
                    Ok(dir)
                }
            }
        }
        None => {
            let dir = base.join(&wanted_name);
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                info!("New playlist directory created: {:?}", dir);
            }
            Ok(dir)
        }
    }
}

/// Deletes manifests other than the playlist's own and hidden files other
/// than the ledger and the link file. Returns the removed names.
pub fn remove_extra_files(dir: &Path, playlist_name: &str) -> Result<Vec<String>, LibraryError> {
    let keep_manifest = manifest_path(dir, playlist_name);
    let keep_hidden = [LEDGER_FILE_NAME.to_string(), link::link_file_name(playlist_name)];
    let mut removed = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        let extra_manifest = is_manifest(&path) && path != keep_manifest;
        let extra_hidden = name.starts_with('.') && !keep_hidden.contains(&name);
        if !extra_manifest && !extra_hidden {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed extra file {:?}", path);
                removed.push(name);
            }
            Err(err) => warn!("Failed to remove {:?}: {}", path, err),
        }
    }
    Ok(removed)
}

/// Copies playlist songs missing from `dir` out of sibling playlist
/// directories under `base`, carrying their ledger rows along.
pub fn import_from_siblings(
    base: &Path,
    dir: &Path,
    records: &[TrackRecord],
) -> Result<ImportReport, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let mut wanted: HashMap<String, &TrackRecord> = HashMap::new();
    for record in records.iter().filter(|record| record.is_complete()) {
        let stem = canonical_stem(&record.artist, &record.title);
        if index.existing_name_for(&stem).is_none() {
            wanted.insert(normalize(&record.canonical_filename()), record);
        }
    }
    let mut report = ImportReport::default();
    if wanted.is_empty() {
        return Ok(report);
    }

    let mut rows = ledger::read(dir)?;
    let mut tracked: HashSet<_> = rows.iter().map(LedgerRow::identity_key).collect();
    let mut sibling_rows: HashMap<PathBuf, Vec<LedgerRow>> = HashMap::new();

    for entry in WalkDir::new(base)
        .follow_links(false)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let src = entry.path();
        let src_dir = match src.parent() {
            Some(parent) if parent != dir => parent,
            _ => continue,
        };
        let record = match wanted.remove(&normalize(&entry.file_name().to_string_lossy())) {
            Some(record) => record,
            None => continue,
        };
        let filename = record.canonical_filename();
        if let Err(err) = copy_preserving_mtime(src, &dir.join(&filename)) {
            warn!("Failed to copy {:?} into {:?}: {}", src, dir, err);
            report.failed += 1;
            continue;
        }
        info!("Copied {:?} from {:?}", filename, src_dir);
        report.copied.push(filename.clone());

        let key = record.identity_key();
        if tracked.contains(&key) {
            continue;
        }
        let source_rows = sibling_rows
            .entry(src_dir.to_path_buf())
            .or_insert_with(|| match ledger::read(src_dir) {
                Ok(rows) => rows,
                Err(err) => {
                    warn!("Failed to read ledger in {:?}: {}", src_dir, err);
                    Vec::new()
                }
            });
        if let Some(row) = source_rows.iter().find(|row| row.identity_key() == key) {
            let mut row = row.clone();
            row.filename = filename;
            rows.push(row);
            tracked.insert(key);
        }
    }

    if !report.copied.is_empty() {
        ledger::write(dir, &mut rows)?;
    }
    Ok(report)
}

/// How much of the playlist is present in `dir`, found among `local_files`
/// (names of the user's own tracks), or missing altogether.
pub fn playlist_status(
    dir: &Path,
    records: &[TrackRecord],
    local_files: &BTreeSet<String>,
) -> Result<PlaylistStatus, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let local: HashSet<String> = local_files.iter().map(|name| normalize(name)).collect();
    let expected = expected_filenames(records);
    let mut status = PlaylistStatus {
        total: expected.len(),
        ..PlaylistStatus::default()
    };

    for name in expected {
        let variants = possible_filenames(&name);
        if variants.iter().any(|variant| index.contains(variant)) {
            status.downloaded += 1;
        } else if variants.iter().any(|variant| local.contains(&normalize(variant))) {
            status.in_local_files.push(name);
        } else {
            status.missing.push(name);
        }
    }
    Ok(status)
}

/// Rewrites the manifest of every linked playlist directory under `root`
/// from the remote source. Directories whose playlist cannot be fetched are
/// skipped. Stops early once `stop` is raised.
pub fn update_playlists(
    root: &Path,
    source: &dyn PlaylistSource,
    stop: &AtomicBool,
) -> Result<Vec<PathBuf>, LibraryError> {
    let mut written = Vec::new();
    for dir in subdirectories(root)? {
        if stop.load(Ordering::SeqCst) {
            warn!("Interrupted; {} playlists updated", written.len());
            break;
        }
        let url = match link::read_link(&dir).and_then(|link| link.url) {
            Some(url) => url,
            None => continue,
        };
        if !is_playlist_url(&url) {
            warn!("Invalid playlist URL in {:?}", dir);
            continue;
        }
        let playlist = match source.fetch_playlist(&url) {
            Ok(playlist) => playlist,
            Err(err) => {
                warn!("Unable to fetch playlist for {:?}: {}", dir, err);
                continue;
            }
        };
        let path = manifest_path(&dir, playlist.name.trim());
        match manifest::write_manifest(&path, &playlist.tracks) {
            Ok(_) => {
                info!("Updated {:?} ({} tracks)", path, playlist.tracks.len());
                written.push(path);
            }
            Err(err) => warn!("Failed to write {:?}: {}", path, err),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::{
        import_from_siblings, locate_playlist_dir, playlist_status, remove_extra_files,
        update_playlists,
    };
    use crate::ledger;
    use crate::link::write_link_file;
    use crate::source::{PlaylistSource, RemotePlaylist, SourceError};
    use common::{LedgerRow, LedgerTimestamp, TrackRecord};
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;

    const URL: &str = "https://open.spotify.com/playlist/abc";

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    struct FakeSource;

    impl PlaylistSource for FakeSource {
        fn fetch_playlist(&self, url: &str) -> Result<RemotePlaylist, SourceError> {
            if url.ends_with("broken") {
                return Err(SourceError::Api("not found".to_string()));
            }
            Ok(RemotePlaylist {
                name: "Road Trip".to_string(),
                url: url.to_string(),
                tracks: vec![TrackRecord::new("1", "A", "x")],
            })
        }
    }

    #[test]
    fn reuses_and_renames_linked_directory() {
        let base = tempfile::TempDir::new().unwrap();
        let old = base.path().join("Old Name");
        fs::create_dir(&old).unwrap();
        write_link_file(&old, "Old Name", &format!("{URL}?si=1")).unwrap();

        let dir = locate_playlist_dir(base.path(), URL, "New: Name").unwrap();
        assert_eq!(dir, base.path().join("New_ Name"));
        assert!(dir.join(".Old Name").is_file());
        assert!(!old.exists());
    }

    #[test]
    fn creates_directory_for_unknown_playlist() {
        let base = tempfile::TempDir::new().unwrap();
        let dir = locate_playlist_dir(&base.path().join("music"), URL, "Mix?").unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("Mix_"));
    }

    #[test]
    fn removes_stale_manifests_and_hidden_files() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("Mix.m3u8"));
        touch(&dir.path().join("Old Mix.m3u8"));
        touch(&dir.path().join(".song_ids"));
        touch(&dir.path().join(".Mix"));
        touch(&dir.path().join(".Old Mix"));
        touch(&dir.path().join("A - x.mp3"));

        let mut removed = remove_extra_files(dir.path(), "Mix").unwrap();
        removed.sort();
        assert_eq!(removed, vec![".Old Mix".to_string(), "Old Mix.m3u8".to_string()]);
        assert!(dir.path().join("A - x.mp3").is_file());
        assert!(dir.path().join(".song_ids").is_file());
    }

    #[test]
    fn imports_track_and_ledger_row_from_sibling() {
        let base = tempfile::TempDir::new().unwrap();
        let sibling = base.path().join("Other");
        let target = base.path().join("Mix");
        fs::create_dir_all(&target).unwrap();
        touch(&sibling.join("A - x.mp3"));
        let mut rows = vec![LedgerRow {
            remote_id: "1".to_string(),
            timestamp: LedgerTimestamp::parse("2022-02-02 02:02:02"),
            artist: "A".to_string(),
            title: "x".to_string(),
            filename: "A - x.mp3".to_string(),
        }];
        ledger::write(&sibling, &mut rows).unwrap();

        let records = vec![TrackRecord::new("1", "A", "x"), TrackRecord::new("2", "B", "y")];
        let report = import_from_siblings(base.path(), &target, &records).unwrap();
        assert_eq!(report.copied, vec!["A - x.mp3".to_string()]);
        assert!(target.join("A - x.mp3").is_file());
        let imported = ledger::read(&target).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].timestamp.as_str(), "2022-02-02 02:02:02");
    }

    #[test]
    fn unreadable_sibling_ledger_still_copies_track() {
        let base = tempfile::TempDir::new().unwrap();
        let sibling = base.path().join("Other");
        let target = base.path().join("Mix");
        fs::create_dir_all(&target).unwrap();
        touch(&sibling.join("A - x.mp3"));
        fs::create_dir_all(sibling.join(".song_ids")).unwrap();

        let records = vec![TrackRecord::new("1", "A", "x")];
        let report = import_from_siblings(base.path(), &target, &records).unwrap();
        assert_eq!(report.copied, vec!["A - x.mp3".to_string()]);
        assert!(target.join("A - x.mp3").is_file());
        assert!(ledger::read(&target).unwrap().is_empty());
    }

    #[test]
    fn status_splits_downloaded_local_and_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("A - x.mp3"));
        let records = vec![
            TrackRecord::new("1", "A", "x"),
            TrackRecord::new("2", "Mine", "Song"),
            TrackRecord::new("3", "Gone", "Song"),
        ];
        let local: BTreeSet<String> = ["Mine - Song.mp3".to_string()].into_iter().collect();
        let status = playlist_status(dir.path(), &records, &local).unwrap();
        assert_eq!(status.total, 3);
        assert_eq!(status.downloaded, 1);
        assert_eq!(status.in_local_files, vec!["Mine - Song.mp3".to_string()]);
        assert_eq!(status.missing, vec!["Gone - Song.mp3".to_string()]);
    }

    #[test]
    fn update_skips_unfetchable_playlists() {
        let root = tempfile::TempDir::new().unwrap();
        let good = root.path().join("Good");
        let bad = root.path().join("Bad");
        let loose = root.path().join("Loose");
        for dir in [&good, &bad, &loose] {
            fs::create_dir(dir).unwrap();
        }
        write_link_file(&good, "Good", URL).unwrap();
        write_link_file(&bad, "Bad", "https://open.spotify.com/playlist/broken").unwrap();

        let stop = AtomicBool::new(false);
        let written = update_playlists(root.path(), &FakeSource, &stop).unwrap();
        assert_eq!(written, vec![good.join("Road Trip.m3u8")]);
        assert_eq!(
            fs::read_to_string(good.join("Road Trip.m3u8")).unwrap(),
            "A - x.mp3\n"
        );
    }

    #[test]
    fn update_stops_when_interrupted() {
        let root = tempfile::TempDir::new().unwrap();
        let good = root.path().join("Good");
        fs::create_dir(&good).unwrap();
        write_link_file(&good, "Good", URL).unwrap();
        let stop = AtomicBool::new(true);
        assert!(update_playlists(root.path(), &FakeSource, &stop)
            .unwrap()
            .is_empty());
    }
}
