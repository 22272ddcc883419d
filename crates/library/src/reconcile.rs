//! Keeps a playlist directory's `.song_ids` ledger consistent with the
//! files on disk and the current playlist.
//!
//! A full pass runs four steps in order:
//! 1. drop ledger rows whose file is gone,
//! 2. add rows for present files, follow remote id changes and collapse
//!    rows sharing a filename,
//! 3. optionally append rows for existing files the ledger has never seen,
//!    without touching any row that already exists,
//! 4. promote a lone numbered variant to its canonical filename.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use common::names::canonical_stem;
use common::{
    identity_key, normalize, DiffEntry, DiffReason, IdentityKey, LedgerRow, LedgerTimestamp, TrackRecord,
};
use tracing::{debug, info};

use crate::disk::DiskIndex;
use crate::ledger;
use crate::promote::{self, PromotionReport};
use crate::LibraryError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub kept: usize,
    pub dropped_orphans: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdStats {
    pub added: usize,
    pub flipped: usize,
    pub deduped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Run the append-only update for files present on disk.
    pub restricted_update: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            restricted_update: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub cleanup: CleanupStats,
    pub ids: IdStats,
    pub restricted: Vec<DiffEntry>,
    pub promotion: PromotionReport,
}

impl ReconcileReport {
    pub fn changed_anything(&self) -> bool {
        self.cleanup.dropped_orphans > 0
            || self.ids != IdStats::default()
            || !self.restricted.is_empty()
            || !self.promotion.renamed.is_empty()
    }
}

pub fn reconcile_directory(
    dir: &Path,
    records: &[TrackRecord],
    options: &ReconcileOptions,
) -> Result<ReconcileReport, LibraryError> {
    let cleanup = cleanup_orphan_rows(dir)?;
    let ids = reconcile_ids(dir, records)?;
    let restricted = if options.restricted_update {
        let keys = existing_keys(dir, records)?;
        update_existing_only(dir, records, &keys)?
    } else {
        Vec::new()
    };
    let promotion = promote::promote_for_records(dir, records)?;

    info!(
        "Reconciled {:?}: kept {}, dropped {}, added {}, flipped {}, deduped {}, appended {}, promoted {}",
        dir,
        cleanup.kept,
        cleanup.dropped_orphans,
        ids.added,
        ids.flipped,
        ids.deduped,
        restricted.len(),
        promotion.renamed.len()
    );

    Ok(ReconcileReport {
        cleanup,
        ids,
        restricted,
        promotion,
    })
}

/// Keeps only the rows whose file is present in `dir` under exactly the
/// recorded name.
pub fn cleanup_orphan_rows(dir: &Path) -> Result<CleanupStats, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let rows = ledger::read(dir)?;
    let (mut kept, dropped): (Vec<LedgerRow>, Vec<LedgerRow>) = rows
        .into_iter()
        .partition(|row| index.contains_exact(&row.effective_filename()));
    for row in &dropped {
        debug!("Dropping ledger row {} for missing {:?}", row.remote_id, row.filename);
    }
    ledger::write(dir, &mut kept)?;
    Ok(CleanupStats {
        kept: kept.len(),
        dropped_orphans: dropped.len(),
    })
}

/// The current playlist keyed by identity; a later duplicate wins.
fn playlist_by_key(records: &[TrackRecord]) -> BTreeMap<IdentityKey, &TrackRecord> {
    records
        .iter()
        .filter(|record| record.is_complete())
        .map(|record| (record.identity_key(), record))
        .collect()
}

/// Brings ledger rows in line with the playlist for every file present.
///
/// A present file without any row gets a new one. A row found for it (by
/// filename, else by identity) that carries a stale remote id is updated,
/// but only when the row describes the same song. Rows sharing a filename
/// are collapsed to one.
pub fn reconcile_ids(dir: &Path, records: &[TrackRecord]) -> Result<IdStats, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let mut rows = ledger::read(dir)?;
    let playlist = playlist_by_key(records);

    let mut by_fname: HashMap<String, usize> = HashMap::new();
    let mut by_key: HashMap<IdentityKey, usize> = HashMap::new();
    let mut known_ids: HashSet<(String, String)> = HashSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let fname = row.effective_filename();
        known_ids.insert((fname.clone(), row.remote_id.clone()));
        by_fname.insert(fname, idx);
        let key = row.identity_key();
        let newer = match by_key.get(&key) {
            Some(&current) => row.timestamp > rows[current].timestamp,
            None => true,
        };
        if newer {
            by_key.insert(key, idx);
        }
    }

    let mut stats = IdStats::default();
    for (key, record) in &playlist {
        let fname = match index.actual_name(&record.canonical_filename()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if known_ids.contains(&(fname.clone(), record.remote_id.clone())) {
            continue;
        }
        match by_fname.get(&fname).or_else(|| by_key.get(key)).copied() {
            None => {
                rows.push(LedgerRow::for_record(record, &fname));
                by_fname.insert(fname, rows.len() - 1);
                by_key.insert(key.clone(), rows.len() - 1);
                stats.added += 1;
            }
            Some(idx) => {
                let row = &mut rows[idx];
                if row.remote_id != record.remote_id && row.identity_key() == *key {
                    info!(
                        "Remote id for {:?} changed: {} -> {}",
                        fname, row.remote_id, record.remote_id
                    );
                    row.remote_id = record.remote_id.clone();
                    row.timestamp = LedgerTimestamp::now();
                    stats.flipped += 1;
                }
            }
        }
    }

    let before = rows.len();
    let mut kept: Vec<LedgerRow> = Vec::with_capacity(before);
    let mut slot_by_fname: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let fname = row.effective_filename();
        match slot_by_fname.get(&fname) {
            None => {
                slot_by_fname.insert(fname, kept.len());
                kept.push(row);
            }
            Some(&slot) => {
                if prefer_incoming(&kept[slot], &row, &playlist) {
                    kept[slot] = row;
                }
            }
        }
    }
    stats.deduped = before - kept.len();

    ledger::write(dir, &mut kept)?;
    Ok(stats)
}

/// Between two rows for one file, the one carrying the playlist's current id
/// wins; otherwise the newer row wins and ties keep the earlier row.
fn prefer_incoming(
    current: &LedgerRow,
    incoming: &LedgerRow,
    playlist: &BTreeMap<IdentityKey, &TrackRecord>,
) -> bool {
    let wanted = playlist
        .get(&incoming.identity_key())
        .or_else(|| playlist.get(&current.identity_key()))
        .map(|record| record.remote_id.as_str());
    if let Some(wanted) = wanted {
        let incoming_matches = incoming.remote_id == wanted;
        let current_matches = current.remote_id == wanted;
        if incoming_matches != current_matches {
            return incoming_matches;
        }
    }
    incoming.timestamp > current.timestamp
}

/// Identity keys of the records whose song is present in `dir`, either under
/// its canonical filename or as a numbered variant of it. A numbered file
/// that is another record's canonical name does not count as a variant.
pub fn existing_keys(
    dir: &Path,
    records: &[TrackRecord],
) -> Result<HashSet<IdentityKey>, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let expected: HashSet<String> = promote::expected_filenames(records)
        .iter()
        .map(|name| normalize(name))
        .collect();
    Ok(records
        .iter()
        .filter(|record| record.is_complete())
        .filter(|record| {
            let stem = canonical_stem(&record.artist, &record.title);
            index.existing_name_excluding(&stem, &expected).is_some()
        })
        .map(TrackRecord::identity_key)
        .collect())
}

/// Proposes a new row for every record in `restrict` that has no history in
/// the ledger. Identity keys that already have rows are never proposed.
pub fn diff_existing_only(
    dir: &Path,
    records: &[TrackRecord],
    restrict: &HashSet<IdentityKey>,
) -> Result<Vec<DiffEntry>, LibraryError> {
    let rows = ledger::read(dir)?;
    let tracked: HashSet<IdentityKey> = rows
        .iter()
        .filter(|row| row.is_complete())
        .map(LedgerRow::identity_key)
        .collect();

    let mut proposed: HashSet<IdentityKey> = HashSet::new();
    let mut diffs = Vec::new();
    for record in records.iter().filter(|record| record.is_complete()) {
        let key = record.identity_key();
        if !restrict.contains(&key) || tracked.contains(&key) {
            continue;
        }
        if !proposed.insert(key) {
            continue;
        }
        diffs.push(DiffEntry {
            artist: record.artist.clone(),
            title: record.title.clone(),
            old_id: None,
            new_id: record.remote_id.clone(),
            earliest_timestamp: LedgerTimestamp::now(),
            canonical_filename: record.canonical_filename(),
            reason: DiffReason::NewExistingFile,
        });
    }
    Ok(diffs)
}

/// Appends the proposed rows, pointing each at the file actually on disk.
/// Existing rows are written back unchanged. A file another row already
/// points at is never claimed a second time, and a diff with no unclaimed
/// file is dropped. Returns the diffs that became rows.
pub fn apply_existing_only(
    dir: &Path,
    diffs: &[DiffEntry],
) -> Result<Vec<DiffEntry>, LibraryError> {
    if diffs.is_empty() {
        return Ok(Vec::new());
    }
    let index = DiskIndex::scan(dir)?;
    let mut rows = ledger::read(dir)?;
    let mut tracked: HashSet<IdentityKey> = rows
        .iter()
        .filter(|row| row.is_complete())
        .map(LedgerRow::identity_key)
        .collect();
    let mut claimed: HashSet<String> = rows
        .iter()
        .map(|row| normalize(&row.effective_filename()))
        .collect();

    let mut applied = Vec::new();
    for diff in diffs {
        if tracked.contains(&identity_key(&diff.artist, &diff.title)) {
            continue;
        }
        let stem = canonical_stem(&diff.artist, &diff.title);
        let filename = match index.existing_name_excluding(&stem, &claimed) {
            Some(name) if !claimed.contains(&normalize(name)) => name.to_string(),
            _ => {
                debug!("No unclaimed file for {:?}", diff.canonical_filename);
                continue;
            }
        };
        tracked.insert(identity_key(&diff.artist, &diff.title));
        claimed.insert(normalize(&filename));
        rows.push(LedgerRow {
            remote_id: diff.new_id.clone(),
            timestamp: diff.earliest_timestamp.clone(),
            artist: diff.artist.clone(),
            title: diff.title.clone(),
            filename,
        });
        applied.push(diff.clone());
    }
    ledger::write(dir, &mut rows)?;
    Ok(applied)
}

pub fn update_existing_only(
    dir: &Path,
    records: &[TrackRecord],
    restrict: &HashSet<IdentityKey>,
) -> Result<Vec<DiffEntry>, LibraryError> {
    let diffs = diff_existing_only(dir, records, restrict)?;
    if diffs.is_empty() {
        debug!("No untracked files in {:?}", dir);
        return Ok(diffs);
    }
    for diff in &diffs {
        debug!(
            "{}: {} ({} - {})",
            diff.reason, diff.new_id, diff.artist, diff.title
        );
    }
    let applied = apply_existing_only(dir, &diffs)?;
    info!("Tracked {} existing files in {:?}", applied.len(), dir);
    Ok(applied)
}
