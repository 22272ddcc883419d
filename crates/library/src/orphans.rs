use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use common::names::is_track_file;
use common::{normalize, possible_filenames, sanitize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::confirm::Confirm;
use crate::manifest::{self, is_manifest};
use crate::LibraryError;

/// macOS writes `._<name>` resource forks next to files on foreign volumes.
const RESOURCE_FORK_PREFIX: &str = "._";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrphanReport {
    /// Library tracks no manifest references.
    pub orphans: BTreeSet<String>,
    /// Orphans that are not local files either.
    pub leftovers: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<String>,
    pub failed: usize,
    pub declined: bool,
}

/// Sanitized names of all tracks below `root`. A missing root is empty.
pub fn track_names_under(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| is_track_file(name) && !name.starts_with(RESOURCE_FORK_PREFIX))
        .map(|name| sanitize(&name))
        .collect()
}

/// Sanitized references of every manifest directly inside `playlist_dir`.
pub fn referenced_tracks(playlist_dir: &Path) -> Result<BTreeSet<String>, LibraryError> {
    let mut referenced = BTreeSet::new();
    for path in manifests_in(playlist_dir)? {
        match manifest::read_references(&path) {
            Ok(references) => {
                referenced.extend(references.iter().map(|reference| sanitize(reference)));
            }
            Err(err) => warn!("Failed to read manifest {:?}: {}", path, err),
        }
    }
    Ok(referenced)
}

fn manifests_in(dir: &Path) -> Result<Vec<std::path::PathBuf>, LibraryError> {
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

pub fn find_orphans(library: &BTreeSet<String>, referenced: &BTreeSet<String>) -> BTreeSet<String> {
    library.difference(referenced).cloned().collect()
}

pub fn find_leftovers(orphans: &BTreeSet<String>, local: &BTreeSet<String>) -> BTreeSet<String> {
    orphans.difference(local).cloned().collect()
}

/// Orphans and leftovers of a consolidated library against the manifests in
/// `playlist_dir` and the user's local files.
pub fn scan(
    playlist_dir: &Path,
    library_dir: &Path,
    local_files_dir: &Path,
) -> Result<OrphanReport, LibraryError> {
    let referenced = referenced_tracks(playlist_dir)?;
    let library = track_names_under(library_dir);
    let local = track_names_under(local_files_dir);
    let orphans = find_orphans(&library, &referenced);
    let leftovers = find_leftovers(&orphans, &local);
    Ok(OrphanReport { orphans, leftovers })
}

/// Deletes leftover tracks from `library_dir`, asking first unless
/// `auto_confirm` is set. Files already gone are skipped.
pub fn remove_leftovers(
    leftovers: &BTreeSet<String>,
    library_dir: &Path,
    confirm: &dyn Confirm,
    auto_confirm: bool,
) -> RemovalReport {
    let mut report = RemovalReport::default();
    if leftovers.is_empty() {
        return report;
    }
    let prompt = format!("Remove {} leftover song(s)?", leftovers.len());
    if !auto_confirm && !confirm.confirm(&prompt) {
        report.declined = true;
        return report;
    }
    for name in leftovers {
        let path = library_dir.join(name);
        if !path.exists() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed leftover {:?}", path);
                report.removed.push(name.clone());
            }
            Err(err) => {
                warn!("Failed to remove {:?}: {}", path, err);
                report.failed += 1;
            }
        }
    }
    report
}

/// Songs referenced by each manifest in `m3u_dir` that exist neither in
/// `songs_dir` (under any known spelling) nor among `local_files`. Only
/// manifests with something missing appear in the result.
pub fn missing_songs(
    m3u_dir: &Path,
    songs_dir: &Path,
    local_files: &BTreeSet<String>,
) -> Result<BTreeMap<String, Vec<String>>, LibraryError> {
    let local: BTreeSet<String> = local_files.iter().map(|name| normalize(name)).collect();
    let mut result = BTreeMap::new();
    for path in manifests_in(m3u_dir)? {
        let references = match manifest::read_references(&path) {
            Ok(references) => references,
            Err(err) => {
                warn!("Failed to read manifest {:?}: {}", path, err);
                continue;
            }
        };
        let missing: Vec<String> = references
            .into_iter()
            .filter(|song| !is_available(song, songs_dir, &local))
            .collect();
        if !missing.is_empty() {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            result.insert(name, missing);
        }
    }
    Ok(result)
}

fn is_available(song: &str, songs_dir: &Path, local: &BTreeSet<String>) -> bool {
    if Path::new(song).is_absolute() {
        return Path::new(song).exists();
    }
    possible_filenames(song).iter().any(|candidate| {
        songs_dir.join(candidate).is_file() || local.contains(&normalize(candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::{missing_songs, remove_leftovers, scan, track_names_under};
    use crate::confirm::{AutoConfirm, Decline};
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn skips_resource_forks_and_sanitizes() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("a").join("Who - What?.mp3"));
        touch(&dir.path().join("._Who - What_.mp3"));
        let names = track_names_under(dir.path());
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["Who - What_.mp3"]);
    }

    #[test]
    fn orphans_minus_local_are_leftovers() {
        let dir = tempfile::TempDir::new().unwrap();
        let playlists = dir.path().join("playlists");
        let library = dir.path().join("library");
        let local = dir.path().join("local");
        fs::create_dir_all(&playlists).unwrap();
        fs::write(playlists.join("Mix.m3u8"), "Kept - Song.mp3\n").unwrap();
        touch(&library.join("Kept - Song.mp3"));
        touch(&library.join("Local - Song.mp3"));
        touch(&library.join("Gone - Song.mp3"));
        touch(&local.join("Local - Song.mp3"));

        let report = scan(&playlists, &library, &local).unwrap();
        assert_eq!(report.orphans.len(), 2);
        assert_eq!(
            report.leftovers.into_iter().collect::<Vec<_>>(),
            vec!["Gone - Song.mp3"]
        );
    }

    #[test]
    fn removal_respects_confirmation() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("Gone - Song.mp3"));
        let leftovers: BTreeSet<String> = ["Gone - Song.mp3".to_string(), "Absent.mp3".to_string()]
            .into_iter()
            .collect();

        let declined = remove_leftovers(&leftovers, dir.path(), &Decline, false);
        assert!(declined.declined);
        assert!(dir.path().join("Gone - Song.mp3").exists());

        let report = remove_leftovers(&leftovers, dir.path(), &Decline, true);
        assert_eq!(report.removed, vec!["Gone - Song.mp3".to_string()]);
        assert_eq!(report.failed, 0);

        let nothing = remove_leftovers(&BTreeSet::new(), dir.path(), &AutoConfirm, false);
        assert!(nothing.removed.is_empty());
    }

    #[test]
    fn missing_songs_accept_known_spellings_and_local_files() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join("Mix.m3u8"),
            "Beyoncé - Halo.mp3\nLocal - Song.mp3\nNowhere - Song.mp3\n",
        )
        .unwrap();
        touch(&dir.path().join("Beyonce - Halo.mp3"));
        let local: BTreeSet<String> = ["Local - Song.mp3".to_string()].into_iter().collect();

        let missing = missing_songs(dir.path(), dir.path(), &local).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing["Mix.m3u8"], vec!["Nowhere - Song.mp3".to_string()]);
    }
}
