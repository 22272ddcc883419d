use std::fmt;

use common::TrackRecord;

/// A playlist as delivered by the remote catalog.
#[derive(Clone, Debug, Default)]
pub struct RemotePlaylist {
    pub name: String,
    pub url: String,
    pub tracks: Vec<TrackRecord>,
}

#[derive(Debug)]
pub enum SourceError {
    InvalidUrl(String),
    Api(String),
    Http(String),
    Decode(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::InvalidUrl(url) => write!(f, "invalid playlist url: {}", url),
            SourceError::Api(message) => write!(f, "api error: {}", message),
            SourceError::Http(message) => write!(f, "http error: {}", message),
            SourceError::Decode(message) => write!(f, "decode error: {}", message),
        }
    }
}

impl std::error::Error for SourceError {}

/// Fetches the current contents of a remote playlist.
pub trait PlaylistSource {
    fn fetch_playlist(&self, url: &str) -> Result<RemotePlaylist, SourceError>;
}
