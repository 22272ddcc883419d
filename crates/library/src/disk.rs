use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::names::{is_track_file, TRACK_EXTENSION};
use common::{normalize, split_numbered};
use tracing::warn;

use crate::LibraryError;

/// Snapshot of the track files directly inside one directory.
///
/// Lookups compare normalized names, so a file whose name differs from the
/// expected one only in case or Unicode composition counts as present.
#[derive(Debug, Default, Clone)]
pub struct DiskIndex {
    dir: PathBuf,
    names: BTreeSet<String>,
    folded: HashMap<String, String>,
    by_base: HashMap<String, Vec<(Option<u32>, String)>>,
}

impl DiskIndex {
    /// Lists `dir` without recursing. A missing directory gives an empty index.
    pub fn scan(dir: &Path) -> Result<Self, LibraryError> {
        let mut index = DiskIndex {
            dir: dir.to_path_buf(),
            ..DiskIndex::default()
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(index),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Failed to read entry in {:?}: {}", dir, err);
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if is_track_file(&name) {
                index.insert(name);
            }
        }
        Ok(index)
    }

    fn insert(&mut self, name: String) {
        if let Some((base, n)) = split_numbered(&name) {
            self.by_base
                .entry(normalize(base))
                .or_default()
                .push((n, name.clone()));
        }
        self.folded.insert(normalize(&name), name.clone());
        self.names.insert(name);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actual_name(name).is_some()
    }

    /// Byte-for-byte match, no folding.
    pub fn contains_exact(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// The on-disk spelling of `name`, exact match first.
    pub fn actual_name(&self, name: &str) -> Option<&str> {
        if let Some(found) = self.names.get(name) {
            return Some(found.as_str());
        }
        self.folded.get(&normalize(name)).map(String::as_str)
    }

    /// Files named `<stem>_<n>.mp3`, lowest `n` first.
    pub fn numbered_variants(&self, stem: &str) -> Vec<&str> {
        let mut found: Vec<(u32, &str)> = self
            .by_base
            .get(&normalize(stem))
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(n, name)| n.map(|n| (n, name.as_str())))
                    .collect()
            })
            .unwrap_or_default();
        found.sort();
        found.into_iter().map(|(_, name)| name).collect()
    }

    /// The file holding the song whose canonical stem is `stem`: the canonical
    /// file itself when present, otherwise the lowest numbered variant.
    pub fn existing_name_for(&self, stem: &str) -> Option<&str> {
        self.existing_name_excluding(stem, &HashSet::new())
    }

    /// Like [`DiskIndex::existing_name_for`], but numbered variants whose
    /// normalized name is in `excluded` are passed over. The canonical file
    /// is never excluded.
    pub fn existing_name_excluding(&self, stem: &str, excluded: &HashSet<String>) -> Option<&str> {
        let canonical = format!("{}{}", stem, TRACK_EXTENSION);
        self.actual_name(&canonical).or_else(|| {
            self.numbered_variants(stem)
                .into_iter()
                .find(|name| !excluded.contains(&normalize(name)))
        })
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}
