//! Hidden per-directory link files recording which remote playlist a
//! directory mirrors: `# <playlist name>` then the playlist URL.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use common::sanitize;
use tracing::warn;

use crate::ledger::LEDGER_FILE_NAME;
use crate::LibraryError;

pub const PLAYLIST_URL_PREFIX: &str = "https://open.spotify.com/playlist/";
const LEGACY_LINK_FILE: &str = ".playlist_name";
const IGNORED_HIDDEN: &[&str] = &[LEDGER_FILE_NAME, ".DS_Store"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlaylistLink {
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Drops the query string (tracking parameters) from a playlist URL.
pub fn clean_playlist_url(url: &str) -> &str {
    url.trim().split('?').next().unwrap_or_default()
}

pub fn is_playlist_url(url: &str) -> bool {
    url.trim().starts_with(PLAYLIST_URL_PREFIX)
}

pub fn playlist_id_from_url(url: &str) -> Option<&str> {
    clean_playlist_url(url)
        .strip_prefix(PLAYLIST_URL_PREFIX)?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
}

pub fn link_file_name(playlist_name: &str) -> String {
    format!(".{}", sanitize(playlist_name))
}

pub fn write_link_file(dir: &Path, playlist_name: &str, url: &str) -> Result<PathBuf, LibraryError> {
    let path = dir.join(link_file_name(playlist_name));
    fs::write(
        &path,
        format!("# {}\n{}", playlist_name, clean_playlist_url(url)),
    )?;
    Ok(path)
}

pub fn parse_link(text: &str) -> PlaylistLink {
    let mut link = PlaylistLink::default();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(title) = line.strip_prefix('#') {
            link.title = Some(title.trim_start_matches('#').trim().to_string());
        } else if line.starts_with("http") {
            link.url = Some(line.to_string());
        }
    }
    link
}

/// Reads the link file of `dir`, trying `.<dirname>`, then the legacy
/// `.playlist_name`, then any other hidden file that holds a URL.
pub fn read_link(dir: &Path) -> Option<PlaylistLink> {
    let dir_name = dir.file_name()?.to_string_lossy().to_string();
    let mut candidates = vec![
        dir.join(format!(".{}", dir_name)),
        dir.join(link_file_name(&dir_name)),
        dir.join(LEGACY_LINK_FILE),
    ];
    if let Ok(entries) = fs::read_dir(dir) {
        let mut others: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_hidden_candidate(path))
            .collect();
        others.sort();
        candidates.extend(others);
    }

    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match fs::read(&path) {
            Ok(bytes) => {
                let link = parse_link(&String::from_utf8_lossy(&bytes));
                if link.url.is_some() {
                    return Some(link);
                }
            }
            Err(err) => warn!("Failed to read link file {:?}: {}", path, err),
        }
    }
    None
}

fn is_hidden_candidate(path: &Path) -> bool {
    let name = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => return false,
    };
    name.starts_with('.')
        && !name.starts_with(LEDGER_FILE_NAME)
        && !IGNORED_HIDDEN.contains(&name)
        && path.is_file()
}

/// Link metadata for every playlist directory under `root`, keyed by
/// sanitized folder name. Directories without a link file map to an empty
/// link.
pub fn playlist_meta(root: &Path) -> Result<BTreeMap<String, PlaylistLink>, LibraryError> {
    let mut meta = BTreeMap::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let folder = entry.file_name().to_string_lossy().to_string();
        meta.insert(sanitize(&folder), read_link(&path).unwrap_or_default());
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::{
        clean_playlist_url, is_playlist_url, parse_link, playlist_id_from_url, playlist_meta,
        read_link, write_link_file, PlaylistLink,
    };
    use std::fs;

    const URL: &str = "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc123";

    #[test]
    fn strips_query_and_extracts_id() {
        assert_eq!(
            clean_playlist_url(URL),
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(playlist_id_from_url(URL), Some("37i9dQZF1DXcBWIGoYBM5M"));
        assert!(is_playlist_url(URL));
        assert!(!is_playlist_url("https://example.com/playlist/x"));
        assert_eq!(playlist_id_from_url("https://open.spotify.com/playlist/"), None);
    }

    #[test]
    fn link_file_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let playlist = dir.path().join("Road Trip_ 2024");
        fs::create_dir(&playlist).unwrap();
        let path = write_link_file(&playlist, "Road Trip: 2024", URL).unwrap();
        assert_eq!(path.file_name().unwrap(), ".Road Trip_ 2024");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Road Trip: 2024\nhttps://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"
        );
        let link = read_link(&playlist).unwrap();
        assert_eq!(link.title.as_deref(), Some("Road Trip: 2024"));
        assert_eq!(
            link.url.as_deref(),
            Some("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M")
        );
    }

    #[test]
    fn parses_legacy_single_line() {
        assert_eq!(
            parse_link("https://open.spotify.com/playlist/x\n"),
            PlaylistLink {
                title: None,
                url: Some("https://open.spotify.com/playlist/x".to_string())
            }
        );
    }

    #[test]
    fn ledger_is_never_a_link_file() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".song_ids"), "1\thttp\tA\tB\tC\n").unwrap();
        assert!(read_link(dir.path()).is_none());
    }

    #[test]
    fn meta_covers_every_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let linked = dir.path().join("Mix");
        fs::create_dir(&linked).unwrap();
        write_link_file(&linked, "Mix", URL).unwrap();
        fs::create_dir(dir.path().join("Loose")).unwrap();
        let meta = playlist_meta(dir.path()).unwrap();
        assert_eq!(meta.len(), 2);
        assert!(meta["Mix"].url.is_some());
        assert_eq!(meta["Loose"], PlaylistLink::default());
    }
}
