//! Keeping duplicate tracks in sync across playlist directories and merging
//! playlist directories into one flat library.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use common::names::is_track_file;
use common::sanitize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::hash_cache::HashCache;
use crate::manifest::{self, is_manifest};
use crate::LibraryError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub replaced: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidateReport {
    pub copied: usize,
    pub up_to_date: usize,
    pub manifests: usize,
    pub failed: usize,
}

fn track_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_track_file(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Groups every track under `root` by filename.
pub fn duplicate_groups(root: &Path) -> HashMap<String, Vec<PathBuf>> {
    let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for path in track_files(root) {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        groups.entry(name).or_default().push(path);
    }
    groups
}

/// The most recently modified copy of every track filename under `root`.
pub fn newest_versions(root: &Path) -> HashMap<String, PathBuf> {
    let mut newest: HashMap<String, (SystemTime, PathBuf)> = HashMap::new();
    for (name, paths) in duplicate_groups(root) {
        for path in paths {
            let mtime = match modified(&path) {
                Ok(mtime) => mtime,
                Err(_) => continue,
            };
            let newer = match newest.get(&name) {
                Some((current, _)) => mtime > *current,
                None => true,
            };
            if newer {
                newest.insert(name.clone(), (mtime, path));
            }
        }
    }
    newest
        .into_iter()
        .map(|(name, (_, path))| (name, path))
        .collect()
}

/// Copies the newest copy of each duplicated track over its older copies.
/// Copies with the same size and digest as the newest one are left alone.
pub fn sync_duplicates(root: &Path, cache: &HashCache) -> SyncReport {
    let newest = newest_versions(root);
    let mut report = SyncReport::default();

    for (name, paths) in duplicate_groups(root) {
        if paths.len() <= 1 {
            continue;
        }
        let src = match newest.get(&name) {
            Some(src) => src,
            None => continue,
        };
        let src_size = match fs::metadata(src) {
            Ok(metadata) => metadata.len(),
            Err(_) => continue,
        };
        let mut src_digest: Option<String> = None;

        for dst in paths.iter().filter(|dst| *dst != src) {
            let dst_size = match fs::metadata(dst) {
                Ok(metadata) => metadata.len(),
                Err(_) => continue,
            };
            if dst_size == src_size {
                if src_digest.is_none() {
                    src_digest = cache.digest(src).ok();
                }
                let same = match (&src_digest, cache.digest(dst)) {
                    (Some(a), Ok(b)) => *a == b,
                    _ => false,
                };
                if same {
                    report.skipped += 1;
                    continue;
                }
            }
            match copy_preserving_mtime(src, dst) {
                Ok(()) => report.replaced += 1,
                Err(err) => {
                    warn!("Failed to update {:?} from {:?}: {}", dst, src, err);
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Synchronized {} files across duplicate groups ({} already identical)",
        report.replaced, report.skipped
    );
    report
}

/// Copies `src` over `dst` and gives the copy the source's modification time.
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    let mtime = modified(src)?;
    fs::File::options().write(true).open(dst)?.set_modified(mtime)
}

/// Copies `src` to `dest` when `dest` is missing or older. Returns whether a
/// copy happened.
pub fn copy_if_newer(src: &Path, dest: &Path) -> io::Result<bool> {
    let stale = match modified(dest) {
        Ok(dest_mtime) => modified(src)? > dest_mtime,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => return Err(err),
    };
    if stale {
        copy_preserving_mtime(src, dest)?;
    }
    Ok(stale)
}

/// Merges the tracks and manifests of `src_dirs` into the flat directory
/// `dest`. Tracks land under their sanitized name, manifests are rewritten
/// with sanitized references.
pub fn consolidate_library(src_dirs: &[PathBuf], dest: &Path) -> Result<ConsolidateReport, LibraryError> {
    fs::create_dir_all(dest)?;
    let mut report = ConsolidateReport::default();

    for src_dir in src_dirs {
        let mut files: Vec<PathBuf> = WalkDir::new(src_dir)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        for src in files {
            let name = match src.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            if is_track_file(&name) {
                match copy_if_newer(&src, &dest.join(sanitize(&name))) {
                    Ok(true) => report.copied += 1,
                    Ok(false) => report.up_to_date += 1,
                    Err(err) => {
                        warn!("Failed to copy {:?}: {}", src, err);
                        report.failed += 1;
                    }
                }
            } else if is_manifest(&src) {
                match manifest::sanitize_manifest(&src, &dest.join(&name)) {
                    Ok(()) => report.manifests += 1,
                    Err(err) => {
                        warn!("Failed to copy manifest {:?}: {}", src, err);
                        report.failed += 1;
                    }
                }
            }
        }
    }

    info!(
        "Consolidated into {:?}: {} copied, {} up to date, {} manifests",
        dest, report.copied, report.up_to_date, report.manifests
    );
    Ok(report)
}
