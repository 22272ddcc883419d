use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::LibraryError;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct HashEntry {
    meta: String,
    sha256: String,
}

/// Persistent SHA-256 digests keyed by absolute path. An entry is reused
/// while the file's modification time and size are unchanged.
#[derive(Debug)]
pub struct HashCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, HashEntry>>,
    dirty: Mutex<bool>,
}

impl HashCache {
    /// Loads the cache file; a missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Ignoring corrupt hash cache {:?}: {}", path, err);
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!("Failed to read hash cache {:?}: {}", path, err);
                HashMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
            dirty: Mutex::new(false),
        }
    }

    /// Loads the cache and returns a guard that saves it when dropped.
    pub fn scoped(path: &Path) -> HashCacheGuard {
        HashCacheGuard {
            cache: Self::load(path),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Hex SHA-256 of `path`, served from the cache when the file is unchanged.
    pub fn digest(&self, path: &Path) -> io::Result<String> {
        let metadata = fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let meta = format!("{}:{}", mtime_ns, metadata.len());
        let key = cache_key(path);

        if let Some(entry) = self.entries.lock().get(&key) {
            if entry.meta == meta {
                return Ok(entry.sha256.clone());
            }
        }

        let sha256 = sha256_file(path)?;
        self.entries.lock().insert(
            key,
            HashEntry {
                meta,
                sha256: sha256.clone(),
            },
        );
        *self.dirty.lock() = true;
        Ok(sha256)
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        if !*self.dirty.lock() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&*self.entries.lock())?;
        fs::write(&self.path, bytes)?;
        *self.dirty.lock() = false;
        debug!("Saved hash cache to {:?}", self.path);
        Ok(())
    }
}

/// Holds a [`HashCache`] for the length of a scope and persists it on drop,
/// including early returns and unwinding.
pub struct HashCacheGuard {
    cache: HashCache,
}

impl Deref for HashCacheGuard {
    type Target = HashCache;

    fn deref(&self) -> &HashCache {
        &self.cache
    }
}

impl Drop for HashCacheGuard {
    fn drop(&mut self) {
        if let Err(err) = self.cache.save() {
            warn!("Failed to save hash cache {:?}: {}", self.cache.path, err);
        }
    }
}

fn cache_key(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
