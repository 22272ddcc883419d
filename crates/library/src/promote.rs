use std::collections::HashSet;
use std::fs;
use std::path::Path;

use common::names::TRACK_EXTENSION;
use common::{normalize, TrackRecord};
use tracing::{info, warn};

use crate::disk::DiskIndex;
use crate::ledger;
use crate::LibraryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Clone)]
pub struct PromotionReport {
    pub renamed: Vec<Rename>,
    /// Canonical names left alone because several numbered copies exist.
    pub ambiguous: Vec<String>,
    pub failed: usize,
}

/// Canonical filenames of the playlist, first occurrence order, no repeats.
pub fn expected_filenames(records: &[TrackRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| record.is_complete())
        .map(TrackRecord::canonical_filename)
        .filter(|name| seen.insert(normalize(name)))
        .collect()
}

pub fn promote_for_records(
    dir: &Path,
    records: &[TrackRecord],
) -> Result<PromotionReport, LibraryError> {
    promote_variants(dir, &expected_filenames(records))
}

/// Renames `<stem>_<n>.mp3` to `<stem>.mp3` when the canonical file is
/// missing and exactly one numbered copy exists. With two or more copies the
/// name is reported as ambiguous and nothing moves. Ledger rows pointing at a
/// renamed file are updated to the new name.
pub fn promote_variants(dir: &Path, expected: &[String]) -> Result<PromotionReport, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let expected_set: HashSet<String> = expected.iter().map(|name| normalize(name)).collect();
    let mut report = PromotionReport::default();

    for canonical in expected {
        if index.contains(canonical) {
            continue;
        }
        let stem = match canonical.strip_suffix(TRACK_EXTENSION) {
            Some(stem) => stem,
            None => continue,
        };
        let candidates: Vec<&str> = index
            .numbered_variants(stem)
            .into_iter()
            .filter(|name| !expected_set.contains(&normalize(name)))
            .collect();
        match candidates.as_slice() {
            [] => {}
            [single] => match fs::rename(index.path_of(single), index.path_of(canonical)) {
                Ok(()) => {
                    info!("Promoted {:?} to {:?}", single, canonical);
                    report.renamed.push(Rename {
                        from: single.to_string(),
                        to: canonical.clone(),
                    });
                }
                Err(err) => {
                    warn!("Failed to rename {:?} to {:?}: {}", single, canonical, err);
                    report.failed += 1;
                }
            },
            many => {
                info!(
                    "Leaving {} numbered copies of {:?} in place",
                    many.len(),
                    canonical
                );
                report.ambiguous.push(canonical.clone());
            }
        }
    }

    if !report.renamed.is_empty() {
        refresh_ledger_filenames(dir, &report.renamed)?;
    }
    Ok(report)
}

/// Points ledger rows at the new name of each renamed file.
pub fn refresh_ledger_filenames(dir: &Path, renames: &[Rename]) -> Result<usize, LibraryError> {
    let mut rows = ledger::read(dir)?;
    let mut updated = 0;
    for row in rows.iter_mut() {
        if let Some(rename) = renames.iter().find(|rename| rename.from == row.filename) {
            row.filename = rename.to.clone();
            updated += 1;
        }
    }
    if updated > 0 {
        ledger::write(dir, &mut rows)?;
    }
    Ok(updated)
}
