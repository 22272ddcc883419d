use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use common::names::TRACK_EXTENSION;
use common::{normalize, possible_filenames, sanitize, split_numbered, TrackRecord};
use tracing::{info, warn};

use crate::confirm::Confirm;
use crate::disk::DiskIndex;
use crate::promote::{expected_filenames, Rename};
use crate::LibraryError;

#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    /// Files renamed to their sanitized spelling.
    pub sanitized: Vec<Rename>,
    /// Files renamed from a known alternative spelling.
    pub respelled: Vec<Rename>,
    pub removed: Vec<String>,
    /// Alternative spellings left in place because the playlist name is
    /// already taken.
    pub duplicates: Vec<Rename>,
    pub failed: usize,
}

impl PruneReport {
    pub fn changed_anything(&self) -> bool {
        !self.sanitized.is_empty() || !self.respelled.is_empty() || !self.removed.is_empty()
    }
}

/// Brings the track files of `dir` in line with the playlist.
///
/// Misspelled copies of playlist songs are renamed, duplicates and files
/// belonging to no playlist song are removed. Every removal and every
/// respelling is confirmed first. Numbered copies of playlist songs are
/// never removed here.
pub fn prune_unexpected_files(
    dir: &Path,
    records: &[TrackRecord],
    confirm: &dyn Confirm,
) -> Result<PruneReport, LibraryError> {
    let mut report = PruneReport::default();
    let expected = expected_filenames(records);
    if expected.is_empty() {
        warn!("Playlist for {:?} is empty; leaving files alone", dir);
        return Ok(report);
    }
    let expected_set: HashSet<String> = expected.iter().map(|name| normalize(name)).collect();

    sanitize_names(dir, &expected_set, confirm, &mut report)?;

    let mut spellings: HashMap<String, String> = HashMap::new();
    for name in &expected {
        for variant in possible_filenames(name) {
            let folded = normalize(&variant);
            if !expected_set.contains(&folded) {
                spellings.entry(folded).or_insert_with(|| name.clone());
            }
        }
    }
    respell_variants(dir, &expected_set, &spellings, confirm, &mut report)?;

    let bases: HashSet<String> = expected
        .iter()
        .filter_map(|name| name.strip_suffix(TRACK_EXTENSION))
        .map(normalize)
        .collect();
    remove_strays(dir, &expected_set, &spellings, &bases, confirm, &mut report)?;

    Ok(report)
}

fn sanitize_names(
    dir: &Path,
    expected: &HashSet<String>,
    confirm: &dyn Confirm,
    report: &mut PruneReport,
) -> Result<(), LibraryError> {
    let index = DiskIndex::scan(dir)?;
    for name in index.names() {
        if expected.contains(&normalize(name)) {
            continue;
        }
        let clean = sanitize(name);
        if clean == name || !expected.contains(&normalize(&clean)) {
            continue;
        }
        if index.contains(&clean) {
            let prompt = format!("Remove {:?}, a duplicate of {:?}?", name, clean);
            if confirm.confirm(&prompt) {
                remove_file(&index, name, report);
            }
            continue;
        }
        match fs::rename(index.path_of(name), index.path_of(&clean)) {
            Ok(()) => {
                info!("Renamed {:?} to {:?}", name, clean);
                report.sanitized.push(Rename {
                    from: name.to_string(),
                    to: clean,
                });
            }
            Err(err) => {
                warn!("Failed to rename {:?} to {:?}: {}", name, clean, err);
                report.failed += 1;
            }
        }
    }
    Ok(())
}

fn respell_variants(
    dir: &Path,
    expected: &HashSet<String>,
    spellings: &HashMap<String, String>,
    confirm: &dyn Confirm,
    report: &mut PruneReport,
) -> Result<(), LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut pending: Vec<(&str, &str)> = Vec::new();
    for name in index.names() {
        if expected.contains(&normalize(name)) {
            continue;
        }
        let target = match spellings.get(&normalize(name)) {
            Some(target) => target.as_str(),
            None => continue,
        };
        if index.contains(target) || !claimed.insert(target) {
            info!("Keeping {:?}; {:?} already exists", name, target);
            report.duplicates.push(Rename {
                from: name.to_string(),
                to: target.to_string(),
            });
            continue;
        }
        pending.push((name, target));
    }
    if pending.is_empty() {
        return Ok(());
    }

    let mut prompt = format!("Rename {} file(s) to their playlist names?", pending.len());
    for (from, to) in &pending {
        prompt.push_str(&format!("\n  {} -> {}", from, to));
    }
    if !confirm.confirm(&prompt) {
        return Ok(());
    }
    for (from, to) in pending {
        match fs::rename(index.path_of(from), index.path_of(to)) {
            Ok(()) => report.respelled.push(Rename {
                from: from.to_string(),
                to: to.to_string(),
            }),
            Err(err) => {
                warn!("Failed to rename {:?} to {:?}: {}", from, to, err);
                report.failed += 1;
            }
        }
    }
    Ok(())
}

fn remove_strays(
    dir: &Path,
    expected: &HashSet<String>,
    spellings: &HashMap<String, String>,
    bases: &HashSet<String>,
    confirm: &dyn Confirm,
    report: &mut PruneReport,
) -> Result<(), LibraryError> {
    let index = DiskIndex::scan(dir)?;
    let strays: Vec<&str> = index
        .names()
        .filter(|name| {
            let folded = normalize(name);
            !expected.contains(&folded)
                && !spellings.contains_key(&folded)
                && !is_numbered_copy(name, bases)
        })
        .collect();
    if strays.is_empty() {
        return Ok(());
    }

    let mut prompt = format!("Delete {} file(s) not in the playlist?", strays.len());
    for name in &strays {
        prompt.push_str(&format!("\n  {}", name));
    }
    if !confirm.confirm(&prompt) {
        return Ok(());
    }
    for name in strays {
        remove_file(&index, name, report);
    }
    Ok(())
}

fn is_numbered_copy(name: &str, bases: &HashSet<String>) -> bool {
    match split_numbered(name) {
        Some((base, Some(_))) => bases.contains(&normalize(base)),
        _ => false,
    }
}

fn remove_file(index: &DiskIndex, name: &str, report: &mut PruneReport) {
    match fs::remove_file(index.path_of(name)) {
        Ok(()) => {
            info!("Removed {:?}", name);
            report.removed.push(name.to_string());
        }
        Err(err) => {
            warn!("Failed to remove {:?}: {}", name, err);
            report.failed += 1;
        }
    }
}
