use std::fmt;

pub mod audit;
pub mod confirm;
pub mod consolidate;
pub mod disk;
pub mod hash_cache;
pub mod ledger;
pub mod link;
pub mod manifest;
pub mod orphans;
pub mod playlists;
pub mod promote;
pub mod prune;
pub mod reconcile;
pub mod source;

pub use confirm::{AutoConfirm, Confirm, Decline};
pub use disk::DiskIndex;
pub use hash_cache::{HashCache, HashCacheGuard};
pub use reconcile::{reconcile_directory, ReconcileOptions, ReconcileReport};
pub use source::{PlaylistSource, RemotePlaylist, SourceError};

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Source(SourceError),
    InvalidUrl(String),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
            LibraryError::Source(err) => write!(f, "playlist source error: {}", err),
            LibraryError::InvalidUrl(url) => write!(f, "not a playlist url: {}", url),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

impl From<SourceError> for LibraryError {
    fn from(err: SourceError) -> Self {
        LibraryError::Source(err)
    }
}
