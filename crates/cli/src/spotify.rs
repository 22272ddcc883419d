use std::time::Duration;

use common::TrackRecord;
use library::link::{clean_playlist_url, playlist_id_from_url};
use library::{PlaylistSource, RemotePlaylist, SourceError};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    name: String,
}

#[derive(Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    external_ids: Option<ExternalIds>,
    album: Option<ApiAlbum>,
}

#[derive(Deserialize)]
struct ApiArtist {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}

#[derive(Deserialize)]
struct ApiAlbum {
    release_date: Option<String>,
}

/// Spotify Web API client authorized with client credentials.
pub struct SpotifyClient {
    client: Client,
    token: String,
}

impl SpotifyClient {
    pub fn connect(client_id: &str, client_secret: &str, timeout: Duration) -> Result<Self, SourceError> {
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(SourceError::Api("missing Spotify client credentials".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SourceError::Http(err.to_string()))?;
        let response = client
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(|err| SourceError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Api(format!("token request: http {}", response.status())));
        }
        let token = response
            .json::<TokenResponse>()
            .map_err(|err| SourceError::Decode(err.to_string()))?
            .access_token;
        Ok(Self { client, token })
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|err| SourceError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Api(format!("http {}", response.status())));
        }
        response
            .json::<T>()
            .map_err(|err| SourceError::Decode(err.to_string()))
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<TrackRecord>, SourceError> {
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!(
                "{}/playlists/{}/tracks?offset={}&limit={}",
                API_BASE, playlist_id, offset, PAGE_SIZE
            );
            let page: TracksPage = self.get(&url)?;
            let count = page.items.len();
            tracks.extend(page.items.into_iter().filter_map(track_record));
            debug!("Fetched {} items at offset {}", count, offset);
            if count < PAGE_SIZE {
                break;
            }
            offset += count;
        }
        Ok(tracks)
    }
}

impl PlaylistSource for SpotifyClient {
    fn fetch_playlist(&self, url: &str) -> Result<RemotePlaylist, SourceError> {
        let playlist_id = playlist_id_from_url(url)
            .ok_or_else(|| SourceError::InvalidUrl(url.to_string()))?;
        let meta: PlaylistResponse =
            self.get(&format!("{}/playlists/{}?fields=name", API_BASE, playlist_id))?;
        let tracks = self.playlist_tracks(playlist_id)?;
        Ok(RemotePlaylist {
            name: meta.name.trim().to_string(),
            url: clean_playlist_url(url).to_string(),
            tracks,
        })
    }
}

/// Local files and removed tracks come back without an id or artist and
/// are dropped.
fn track_record(item: PlaylistItem) -> Option<TrackRecord> {
    let track = item.track?;
    let artist = track.artists.into_iter().next()?.name;
    let record = TrackRecord {
        remote_id: track.id?,
        artist,
        title: track.name,
        isrc: track
            .external_ids
            .and_then(|ids| ids.isrc)
            .map(|isrc| isrc.trim().to_uppercase())
            .filter(|isrc| !isrc.is_empty()),
        release_year: track
            .album
            .and_then(|album| album.release_date)
            .and_then(|date| release_year(&date)),
    };
    record.is_complete().then_some(record)
}

fn release_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}
