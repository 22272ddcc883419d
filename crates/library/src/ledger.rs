//! The per-directory `.song_ids` ledger.
//!
//! One row per line, five tab-separated fields:
//! `remote_id`, `timestamp`, `artist`, `title`, `filename`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::{normalize, LedgerRow, LedgerTimestamp};
use tracing::debug;

use crate::LibraryError;

pub const LEDGER_FILE_NAME: &str = ".song_ids";
const FIELD_COUNT: usize = 5;

pub fn ledger_path(dir: &Path) -> PathBuf {
    dir.join(LEDGER_FILE_NAME)
}

/// Reads every well-formed row. A missing ledger is an empty ledger.
pub fn read(dir: &Path) -> Result<Vec<LedgerRow>, LibraryError> {
    let bytes = match fs::read(ledger_path(dir)) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(parse(&String::from_utf8_lossy(&bytes)))
}

pub fn parse(text: &str) -> Vec<LedgerRow> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(row) => rows.push(row),
            None => debug!("Skipping malformed ledger line {}", idx + 1),
        }
    }
    rows
}

fn parse_line(line: &str) -> Option<LedgerRow> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return None;
    }
    Some(LedgerRow {
        remote_id: fields[0].to_string(),
        timestamp: LedgerTimestamp::parse(fields[1]),
        artist: fields[2].to_string(),
        title: fields[3].to_string(),
        filename: fields[4].to_string(),
    })
}

pub fn format_row(row: &LedgerRow) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\n",
        field(&row.remote_id),
        field(row.timestamp.as_str()),
        field(&row.artist),
        field(&row.title),
        field(&row.filename)
    )
}

/// Tabs and line breaks inside a value would split the row.
fn field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Orders rows by normalized artist then title; filename and id break ties
/// so that rewriting an unchanged ledger reproduces it exactly.
pub fn sort_rows(rows: &mut [LedgerRow]) {
    rows.sort_by_cached_key(|row| {
        (
            normalize(&row.artist),
            normalize(&row.title),
            row.filename.clone(),
            row.remote_id.clone(),
        )
    });
}

/// Sorts and writes the full ledger, replacing the old file through a
/// rename so readers never observe a partial ledger.
pub fn write(dir: &Path, rows: &mut [LedgerRow]) -> Result<(), LibraryError> {
    sort_rows(rows);
    let mut contents = String::new();
    for row in rows.iter() {
        contents.push_str(&format_row(row));
    }

    let target = ledger_path(dir);
    let temp = dir.join(format!("{}.tmp", LEDGER_FILE_NAME));
    if let Err(err) = write_atomic(&temp, &target, contents.as_bytes()) {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }
    Ok(())
}

fn write_atomic(temp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)
}

#[cfg(test)]
mod tests {
    use super::{ledger_path, parse, read, write};
    use common::{LedgerRow, LedgerTimestamp};
    use std::fs;

    fn row(id: &str, ts: &str, artist: &str, title: &str, filename: &str) -> LedgerRow {
        LedgerRow {
            remote_id: id.to_string(),
            timestamp: LedgerTimestamp::parse(ts),
            artist: artist.to_string(),
            title: title.to_string(),
            filename: filename.to_string(),
        }
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let text = "1\t2024-01-01 00:00:00\tA\tB\tA - B.mp3\n\nbroken\tline\n2\tx\tC\tD\tC - D.mp3\r\n";
        let rows = parse(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].filename, "C - D.mp3");
        assert!(rows[1].timestamp.value().is_none());
    }

    #[test]
    fn missing_ledger_reads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn writes_sorted_by_normalized_artist_and_title() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rows = vec![
            row("2", "2024-01-01 00:00:00", "zed", "b", "zed - b.mp3"),
            row("1", "2024-01-01 00:00:00", "Abba", "Waterloo", "Abba - Waterloo.mp3"),
            row("3", "garbage", "ABBA", "Dancing Queen", "ABBA - Dancing Queen.mp3"),
        ];
        write(dir.path(), &mut rows).unwrap();
        let text = fs::read_to_string(ledger_path(dir.path())).unwrap();
        let ids: Vec<&str> = text.lines().map(|l| l.split('\t').next().unwrap()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert!(text.contains("\tgarbage\t"));
    }

    #[test]
    fn rewrite_is_byte_identical() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rows = vec![
            row("9", "bad stamp", "B", "x", "B - x.mp3"),
            row("8", "2023-05-05 12:00:00", "a", "y", "a - y.mp3"),
        ];
        write(dir.path(), &mut rows).unwrap();
        let first = fs::read(ledger_path(dir.path())).unwrap();
        let mut again = read(dir.path()).unwrap();
        write(dir.path(), &mut again).unwrap();
        let second = fs::read(ledger_path(dir.path())).unwrap();
        assert_eq!(first, second);
        assert!(!dir.path().join(".song_ids.tmp").exists());
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let gone = dir.path().join("gone");
        assert!(write(&gone, &mut Vec::new()).is_err());
    }
}
