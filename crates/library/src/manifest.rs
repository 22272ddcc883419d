//! Playlist manifests (`*.m3u8`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use common::{sanitize, TrackRecord};

use crate::LibraryError;

pub const MANIFEST_EXTENSION: &str = "m3u8";
const EXTENDED_HEADER: &str = "#EXTM3U";

pub fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
}

pub fn read_references(path: &Path) -> Result<Vec<String>, LibraryError> {
    let bytes = fs::read(path)?;
    Ok(parse_references(&String::from_utf8_lossy(&bytes)))
}

/// File references in order of first appearance.
///
/// An extended manifest alternates metadata and reference lines after its
/// header, so only odd lines count; a plain one lists every non-comment line.
pub fn parse_references(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let candidates: Vec<&str> = match lines.first() {
        Some(&EXTENDED_HEADER) => lines.iter().skip(1).step_by(2).copied().collect(),
        _ => lines
            .iter()
            .filter(|line| !line.starts_with('#'))
            .copied()
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

pub fn count_unique_songs(path: &Path) -> Result<usize, LibraryError> {
    Ok(read_references(path)?.len())
}

/// Writes one canonical filename per line in playlist order and returns the
/// lines written.
pub fn write_manifest(path: &Path, records: &[TrackRecord]) -> Result<Vec<String>, LibraryError> {
    let lines: Vec<String> = records
        .iter()
        .filter(|record| record.is_complete())
        .map(TrackRecord::canonical_filename)
        .collect();
    let mut contents = lines.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(lines)
}

/// Copies a manifest with every reference line sanitized; comment lines are
/// kept verbatim.
pub fn sanitize_manifest(src: &Path, dest: &Path) -> Result<(), LibraryError> {
    let bytes = fs::read(src)?;
    let text = String::from_utf8_lossy(&bytes);
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
        } else {
            out.push_str(&sanitize(trimmed));
        }
        out.push('\n');
    }
    fs::write(dest, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{count_unique_songs, parse_references, sanitize_manifest, write_manifest};
    use common::TrackRecord;
    use std::fs;

    #[test]
    fn plain_manifest_skips_comments_and_repeats() {
        let text = "# playlist\nA - x.mp3\n\nB - y.mp3\nA - x.mp3\n";
        assert_eq!(parse_references(text), vec!["A - x.mp3", "B - y.mp3"]);
    }

    #[test]
    fn extended_manifest_reads_odd_lines() {
        let text = "#EXTM3U\nA - x.mp3\n#EXTINF\nB - y.mp3\n";
        assert_eq!(parse_references(text), vec!["A - x.mp3", "B - y.mp3"]);
    }

    #[test]
    fn empty_manifest_has_no_references() {
        assert!(parse_references("\n\n").is_empty());
    }

    #[test]
    fn writes_canonical_names_in_playlist_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mix.m3u8");
        let records = vec![
            TrackRecord::new("2", "Zed", "Last?"),
            TrackRecord::new("1", "AC/DC", "First"),
            TrackRecord::new("", "Skipped", "Row"),
        ];
        let lines = write_manifest(&path, &records).unwrap();
        assert_eq!(lines, vec!["Zed - Last_.mp3", "AC_DC - First.mp3"]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Zed - Last_.mp3\nAC_DC - First.mp3\n"
        );
        assert_eq!(count_unique_songs(&path).unwrap(), 2);
    }

    #[test]
    fn sanitizes_reference_lines_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("in.m3u8");
        let dest = dir.path().join("out.m3u8");
        fs::write(&src, "# Mix: best?\nWho - What?.mp3\n").unwrap();
        sanitize_manifest(&src, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "# Mix: best?\nWho - What_.mp3\n"
        );
    }
}
