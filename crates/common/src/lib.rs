use std::cmp::Ordering;
use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod names;
pub mod variants;

pub use names::{canonical_filename, identity_key, normalize, sanitize, split_numbered};
pub use variants::possible_filenames;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry of a remote playlist as delivered by the playlist source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub remote_id: String,
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
}

impl TrackRecord {
    pub fn new(remote_id: &str, artist: &str, title: &str) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            artist: artist.to_string(),
            title: title.to_string(),
            isrc: None,
            release_year: None,
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        identity_key(&self.artist, &self.title)
    }

    pub fn canonical_filename(&self) -> String {
        canonical_filename(&self.artist, &self.title)
    }

    /// Records without artist, title or id cannot be tracked.
    pub fn is_complete(&self) -> bool {
        !self.remote_id.trim().is_empty()
            && !self.artist.trim().is_empty()
            && !self.title.trim().is_empty()
    }
}

/// Normalized (artist, title) pair. Two songs with equal keys are the same
/// logical song regardless of case or Unicode composition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub artist: String,
    pub title: String,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Ledger timestamp. The raw text is kept verbatim so that a row round-trips
/// byte-identically even when it does not parse; ordering uses the parsed
/// value with unparsable text sorting lowest.
#[derive(Clone, Debug)]
pub struct LedgerTimestamp {
    raw: String,
    parsed: Option<NaiveDateTime>,
}

impl LedgerTimestamp {
    pub fn now() -> Self {
        let raw = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            parsed: NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> Option<NaiveDateTime> {
        self.parsed
    }

    fn sort_value(&self) -> NaiveDateTime {
        self.parsed.unwrap_or(NaiveDateTime::MIN)
    }
}

impl PartialEq for LedgerTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.sort_value() == other.sort_value()
    }
}

impl Eq for LedgerTimestamp {}

impl PartialOrd for LedgerTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LedgerTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_value().cmp(&other.sort_value())
    }
}

impl fmt::Display for LedgerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One line of a `.song_ids` file.
#[derive(Clone, Debug)]
pub struct LedgerRow {
    pub remote_id: String,
    pub timestamp: LedgerTimestamp,
    pub artist: String,
    pub title: String,
    pub filename: String,
}

impl LedgerRow {
    pub fn for_record(record: &TrackRecord, filename: &str) -> Self {
        Self {
            remote_id: record.remote_id.clone(),
            timestamp: LedgerTimestamp::now(),
            artist: record.artist.clone(),
            title: record.title.clone(),
            filename: filename.to_string(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        identity_key(&self.artist, &self.title)
    }

    /// The file this row points at; rows with an empty filename fall back to
    /// the canonical name of their artist and title.
    pub fn effective_filename(&self) -> String {
        if self.filename.is_empty() {
            canonical_filename(&self.artist, &self.title)
        } else {
            self.filename.clone()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.remote_id.trim().is_empty()
            && !self.artist.trim().is_empty()
            && !self.title.trim().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffReason {
    NewExistingFile,
}

impl fmt::Display for DiffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffReason::NewExistingFile => f.write_str("new_existing_file"),
        }
    }
}

/// A proposed ledger change produced by the restricted update.
#[derive(Clone, Debug)]
pub struct DiffEntry {
    pub artist: String,
    pub title: String,
    pub old_id: Option<String>,
    pub new_id: String,
    pub earliest_timestamp: LedgerTimestamp,
    pub canonical_filename: String,
    pub reason: DiffReason,
}
