//! Mirroring one remote playlist into its directory under the music root.

use std::error::Error;
use std::path::Path;

use common::TrackRecord;
use library::link::{clean_playlist_url, is_playlist_url, write_link_file};
use library::manifest::write_manifest;
use library::orphans::track_names_under;
use library::playlists::{
    import_from_siblings, locate_playlist_dir, manifest_path, playlist_status, remove_extra_files,
    PlaylistStatus,
};
use library::prune::prune_unexpected_files;
use library::reconcile::cleanup_orphan_rows;
use library::{reconcile_directory, Confirm, LibraryError, PlaylistSource, ReconcileOptions};
use tracing::{info, warn};

use crate::config::MirrorConfig;

pub fn run_extract(
    config: &MirrorConfig,
    url: &str,
    source: &dyn PlaylistSource,
    confirm: &dyn Confirm,
) -> Result<PlaylistStatus, Box<dyn Error>> {
    let url = clean_playlist_url(url);
    if !is_playlist_url(url) {
        return Err(LibraryError::InvalidUrl(url.to_string()).into());
    }

    let playlist = source.fetch_playlist(url)?;
    let name = playlist.name.trim();
    println!("Playlist: {} ({} tracks)", name, playlist.tracks.len());

    let base = config.music_root();
    let dir = locate_playlist_dir(&base, url, name)?;
    write_link_file(&dir, name, url)?;
    remove_extra_files(&dir, name)?;
    write_manifest(&manifest_path(&dir, name), &playlist.tracks)?;

    let options = ReconcileOptions {
        restricted_update: config.restricted_update,
    };
    let report = reconcile_directory(&dir, &playlist.tracks, &options)?;
    println!(
        "Ledger: {} added, {} ids updated, {} duplicates merged, {} existing files tracked",
        report.ids.added,
        report.ids.flipped,
        report.ids.deduped,
        report.restricted.len()
    );
    for canonical in &report.promotion.ambiguous {
        println!("Several numbered copies of {}; left as is", canonical);
    }

    let pruned = prune_unexpected_files(&dir, &playlist.tracks, confirm)?;
    for duplicate in &pruned.duplicates {
        println!("Duplicate of {}: {}", duplicate.to, duplicate.from);
    }
    if pruned.changed_anything() {
        let cleanup = cleanup_orphan_rows(&dir)?;
        info!(
            "Removed {} files, renamed {}, dropped {} ledger rows",
            pruned.removed.len(),
            pruned.sanitized.len() + pruned.respelled.len(),
            cleanup.dropped_orphans
        );
    }

    let imported = import_from_siblings(&base, &dir, &playlist.tracks)?;
    if !imported.copied.is_empty() {
        println!("Copied {} songs from other playlists", imported.copied.len());
        reconcile_directory(&dir, &playlist.tracks, &options)?;
    }

    let local_files = track_names_under(&config.local_files_root());
    let status = playlist_status(&dir, &playlist.tracks, &local_files)?;
    print_status(&status);

    if config.fill_year_tags {
        fill_year_tags(&dir, &playlist.tracks);
    }
    Ok(status)
}

fn print_status(status: &PlaylistStatus) {
    println!(
        "Downloaded {}/{} songs, {} in local files",
        status.downloaded,
        status.total,
        status.in_local_files.len()
    );
    if status.missing.is_empty() {
        println!("All songs are present.");
        return;
    }
    println!("Missing songs [{}]:", status.missing.len());
    for name in &status.missing {
        println!("\t{}", name);
    }
}

fn fill_year_tags(dir: &Path, records: &[TrackRecord]) {
    let mut filled = 0;
    for record in records {
        let year = match record.release_year {
            Some(year) => year,
            None => continue,
        };
        let path = dir.join(record.canonical_filename());
        if !path.is_file() {
            continue;
        }
        match metadata::fill_year_if_missing(&path, year) {
            Ok(true) => filled += 1,
            Ok(false) => {}
            Err(err) => warn!("Failed to set year on {:?}: {}", path, err),
        }
    }
    if filled > 0 {
        info!("Filled year tag on {} files", filled);
    }
}

#[cfg(test)]
mod tests {
    use super::run_extract;
    use crate::config::MirrorConfig;
    use common::TrackRecord;
    use library::{AutoConfirm, PlaylistSource, RemotePlaylist, SourceError};
    use std::fs;

    const URL: &str = "https://open.spotify.com/playlist/mix123";

    struct FixedPlaylist;

    impl PlaylistSource for FixedPlaylist {
        fn fetch_playlist(&self, url: &str) -> Result<RemotePlaylist, SourceError> {
            Ok(RemotePlaylist {
                name: "Mix".to_string(),
                url: url.to_string(),
                tracks: vec![
                    TrackRecord::new("1", "A", "x"),
                    TrackRecord::new("2", "B", "y"),
                ],
            })
        }
    }

    fn config_for(root: &std::path::Path) -> MirrorConfig {
        MirrorConfig {
            music_root: root.join("music").to_string_lossy().to_string(),
            local_files_root: root.join("local").to_string_lossy().to_string(),
            fill_year_tags: false,
            ..MirrorConfig::default()
        }
    }

    #[test]
    fn mirrors_playlist_into_directory() {
        let root = tempfile::TempDir::new().unwrap();
        let config = config_for(root.path());
        let dir = root.path().join("music").join("Mix");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A - x.mp3"), b"a").unwrap();
        fs::write(dir.join("junk.mp3"), b"j").unwrap();

        let status = run_extract(&config, &format!("{URL}?si=1"), &FixedPlaylist, &AutoConfirm).unwrap();
        assert_eq!(status.total, 2);
        assert_eq!(status.downloaded, 1);
        assert_eq!(status.missing, vec!["B - y.mp3".to_string()]);

        assert!(!dir.join("junk.mp3").exists());
        assert_eq!(fs::read_to_string(dir.join("Mix.m3u8")).unwrap(), "A - x.mp3\nB - y.mp3\n");
        assert_eq!(fs::read_to_string(dir.join(".Mix")).unwrap(), format!("# Mix\n{URL}"));
        let ledger = fs::read_to_string(dir.join(".song_ids")).unwrap();
        assert!(ledger.starts_with("1\t"));
        assert!(ledger.trim_end().ends_with("\tA\tx\tA - x.mp3"));
    }

    #[test]
    fn rejects_foreign_urls() {
        let root = tempfile::TempDir::new().unwrap();
        let config = config_for(root.path());
        assert!(run_extract(&config, "https://example.com/playlist/x", &FixedPlaylist, &AutoConfirm).is_err());
        assert!(!root.path().join("music").exists());
    }
}
