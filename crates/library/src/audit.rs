//! Read-only consistency report for one playlist directory.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use common::names::TRACK_EXTENSION;
use common::{normalize, split_numbered, IdentityKey};

use crate::disk::DiskIndex;
use crate::ledger;
use crate::LibraryError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerAudit {
    pub rows: usize,
    /// Filenames of rows whose file is not on disk.
    pub orphan_rows: Vec<String>,
    /// Track files no row points at.
    pub untracked_files: Vec<String>,
    pub duplicate_filenames: Vec<String>,
    pub duplicate_keys: Vec<IdentityKey>,
    /// Stems with two or more numbered copies and no canonical file.
    pub ambiguous_variants: Vec<String>,
}

impl LedgerAudit {
    pub fn is_clean(&self) -> bool {
        self.orphan_rows.is_empty()
            && self.untracked_files.is_empty()
            && self.duplicate_filenames.is_empty()
            && self.duplicate_keys.is_empty()
            && self.ambiguous_variants.is_empty()
    }
}

pub fn audit_directory(dir: &Path) -> Result<LedgerAudit, LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let rows = ledger::read(dir)?;
    let mut audit = LedgerAudit {
        rows: rows.len(),
        ..LedgerAudit::default()
    };

    let mut by_filename: BTreeMap<String, (String, usize)> = BTreeMap::new();
    let mut by_key: BTreeMap<IdentityKey, usize> = BTreeMap::new();
    let mut tracked = HashSet::new();
    for row in &rows {
        let filename = row.effective_filename();
        match index.actual_name(&filename) {
            Some(name) => {
                tracked.insert(name.to_string());
            }
            None => audit.orphan_rows.push(filename.clone()),
        }
        by_filename
            .entry(normalize(&filename))
            .or_insert_with(|| (filename.clone(), 0))
            .1 += 1;
        if row.is_complete() {
            *by_key.entry(row.identity_key()).or_default() += 1;
        }
    }
    audit.duplicate_filenames = by_filename
        .into_values()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    audit.duplicate_keys = by_key
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect();

    let mut numbered: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for name in index.names() {
        if !tracked.contains(name) {
            audit.untracked_files.push(name.to_string());
        }
        if let Some((base, Some(_))) = split_numbered(name) {
            numbered
                .entry(normalize(base))
                .or_insert_with(|| (base.to_string(), 0))
                .1 += 1;
        }
    }
    audit.ambiguous_variants = numbered
        .into_values()
        .filter(|(base, count)| {
            *count > 1 && !index.contains(&format!("{}{}", base, TRACK_EXTENSION))
        })
        .map(|(base, _)| base)
        .collect();

    Ok(audit)
}
