//! Library-wide housekeeping: refreshing manifests, syncing duplicate
//! tracks, merging into the consolidated library and reporting on it.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use common::sanitize;
use library::consolidate::{consolidate_library, sync_duplicates};
use library::link::playlist_meta;
use library::manifest::{count_unique_songs, is_manifest};
use library::orphans::{self, missing_songs, remove_leftovers, track_names_under};
use library::playlists::update_playlists;
use library::{Confirm, HashCache, PlaylistSource};
use tracing::{info, warn};

use crate::config::MirrorConfig;

const NAME_WIDTH: usize = 40;

pub struct ConsolidateOptions<'a> {
    /// Refresh manifests through this source first.
    pub refresh: Option<&'a dyn PlaylistSource>,
    pub merge: bool,
    pub auto_confirm: bool,
}

pub fn run_consolidate(
    config: &MirrorConfig,
    options: &ConsolidateOptions<'_>,
    confirm: &dyn Confirm,
    stop: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let music_root = config.music_root();
    let local_root = config.local_files_root();
    let library_root = config.consolidated_root();
    fs::create_dir_all(&music_root)?;

    if let Some(source) = options.refresh {
        let written = update_playlists(&music_root, source, stop)?;
        println!("Updated {} playlists", written.len());
    }
    if stop.load(Ordering::SeqCst) {
        return Ok(());
    }

    {
        let cache = HashCache::scoped(&config.hash_cache_path());
        let synced = sync_duplicates(&music_root, &cache);
        println!(
            "Duplicates: {} replaced, {} identical, {} failed",
            synced.replaced, synced.skipped, synced.failed
        );
    }
    if stop.load(Ordering::SeqCst) {
        return Ok(());
    }

    if options.merge {
        let prompt = format!("Consolidate into {:?}?", library_root);
        if options.auto_confirm || confirm.confirm(&prompt) {
            let sources = [music_root.clone(), local_root.clone()];
            let report = consolidate_library(&sources, &library_root)?;
            println!(
                "Consolidated: {} copied, {} up to date, {} playlists",
                report.copied, report.up_to_date, report.manifests
            );
        } else {
            info!("Skipping consolidation");
        }
    }

    if !library_root.is_dir() {
        println!("No consolidated library at {:?}", library_root);
        return Ok(());
    }
    print_summary(&music_root, &library_root, &local_root)?;
    clean_leftovers(&library_root, &local_root, confirm, options.auto_confirm)
}

fn clean_leftovers(
    library_root: &Path,
    local_root: &Path,
    confirm: &dyn Confirm,
    auto_confirm: bool,
) -> Result<(), Box<dyn Error>> {
    let report = orphans::scan(library_root, library_root, local_root)?;
    if !report.orphans.is_empty() {
        println!("\nOrphan songs [{}]:", report.orphans.len());
        for song in &report.orphans {
            println!("\t{}", song);
        }
    }
    let removed = remove_leftovers(&report.leftovers, library_root, confirm, auto_confirm);
    if !removed.removed.is_empty() {
        println!("Removed {} leftover songs", removed.removed.len());
    }
    if removed.failed > 0 {
        warn!("Failed to remove {} leftover songs", removed.failed);
    }
    Ok(())
}

fn print_summary(
    music_root: &Path,
    library_root: &Path,
    local_root: &Path,
) -> Result<(), Box<dyn Error>> {
    let local_files = track_names_under(local_root);
    let missing = missing_songs(library_root, library_root, &local_files)?;
    let meta = playlist_meta(music_root)?;

    if missing.is_empty() {
        println!("All playlists are complete.");
    } else {
        println!("Incomplete playlists:");
        for (file, songs) in &missing {
            let name = manifest_stem(file);
            println!(
                "\n\t{:<width$} [{} Missing Songs]",
                name,
                songs.len(),
                width = NAME_WIDTH
            );
            let link = meta.get(&sanitize(&name)).cloned().unwrap_or_default();
            if let Some(title) = link.title.filter(|title| title != &name) {
                println!("\t# {}", title);
            }
            match link.url {
                Some(url) => println!("\n{}\n", url),
                None => println!("\t\tNo link found\n"),
            }
        }
    }

    println!("\nComplete playlists:");
    for path in manifests(library_root)? {
        let file = match path.file_name() {
            Some(file) => file.to_string_lossy().to_string(),
            None => continue,
        };
        if missing.contains_key(&file) {
            continue;
        }
        let count = count_unique_songs(&path)?;
        println!(
            "\t{:<width$} [{:>4} Songs]",
            display_name(&manifest_stem(&file)),
            count,
            width = NAME_WIDTH
        );
    }
    Ok(())
}

fn manifests(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_manifest(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn manifest_stem(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string())
}

fn display_name(name: &str) -> String {
    if name.chars().count() <= 38 {
        return name.to_string();
    }
    let head: String = name.chars().take(35).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::{display_name, run_consolidate, ConsolidateOptions};
    use crate::config::MirrorConfig;
    use library::{AutoConfirm, Decline};
    use std::fs;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn truncates_long_names() {
        assert_eq!(display_name("Short"), "Short");
        let long = "x".repeat(50);
        assert_eq!(display_name(&long), format!("{}...", "x".repeat(35)));
    }

    #[test]
    fn merges_and_removes_leftovers() {
        let root = tempfile::TempDir::new().unwrap();
        let music = root.path().join("music");
        let library = root.path().join("library");
        fs::create_dir_all(music.join("Mix")).unwrap();
        fs::create_dir_all(&library).unwrap();
        fs::write(music.join("Mix").join("A - x.mp3"), b"a").unwrap();
        fs::write(music.join("Mix").join("Mix.m3u8"), "A - x.mp3\n").unwrap();
        fs::write(library.join("Old - Song.mp3"), b"o").unwrap();

        let config = MirrorConfig {
            music_root: music.to_string_lossy().to_string(),
            local_files_root: root.path().join("local").to_string_lossy().to_string(),
            consolidated_root: library.to_string_lossy().to_string(),
            hash_cache_path: root.path().join("hashes.json").to_string_lossy().to_string(),
            ..MirrorConfig::default()
        };
        let options = ConsolidateOptions {
            refresh: None,
            merge: true,
            auto_confirm: false,
        };
        run_consolidate(&config, &options, &AutoConfirm, &AtomicBool::new(false)).unwrap();

        assert!(library.join("A - x.mp3").is_file());
        assert!(library.join("Mix.m3u8").is_file());
        assert!(!library.join("Old - Song.mp3").exists());
    }

    #[test]
    fn declining_leaves_library_alone() {
        let root = tempfile::TempDir::new().unwrap();
        let music = root.path().join("music");
        let library = root.path().join("library");
        fs::create_dir_all(music.join("Mix")).unwrap();
        fs::create_dir_all(&library).unwrap();
        fs::write(music.join("Mix").join("A - x.mp3"), b"a").unwrap();
        fs::write(library.join("Old - Song.mp3"), b"o").unwrap();

        let config = MirrorConfig {
            music_root: music.to_string_lossy().to_string(),
            local_files_root: root.path().join("local").to_string_lossy().to_string(),
            consolidated_root: library.to_string_lossy().to_string(),
            hash_cache_path: root.path().join("hashes.json").to_string_lossy().to_string(),
            ..MirrorConfig::default()
        };
        let options = ConsolidateOptions {
            refresh: None,
            merge: true,
            auto_confirm: false,
        };
        run_consolidate(&config, &options, &Decline, &AtomicBool::new(false)).unwrap();

        assert!(!library.join("A - x.mp3").exists());
        assert!(library.join("Old - Song.mp3").exists());
    }
}
