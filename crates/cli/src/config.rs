use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const CONFIG_ENV: &str = "PLAYLIST_MIRROR_CONFIG";
const CLIENT_ID_ENV: &str = "SPOTIPY_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "SPOTIPY_CLIENT_SECRET";

const DEFAULT_MUSIC_ROOT: &str = "~/Music/Zotify Music";
const DEFAULT_LOCAL_FILES_ROOT: &str = "~/Music/Local Files";
const DEFAULT_CONSOLIDATED_ROOT: &str = "~/Music/Consolidated Library";
const DEFAULT_HASH_CACHE_PATH: &str = "~/.cache/zotify_hashes.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub version: u32,
    pub music_root: String,
    pub local_files_root: String,
    pub consolidated_root: String,
    pub hash_cache_path: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub request_timeout_secs: u64,
    pub restricted_update: bool,
    pub fill_year_tags: bool,
    pub auto_confirm: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: DEFAULT_MUSIC_ROOT.to_string(),
            local_files_root: DEFAULT_LOCAL_FILES_ROOT.to_string(),
            consolidated_root: DEFAULT_CONSOLIDATED_ROOT.to_string(),
            hash_cache_path: DEFAULT_HASH_CACHE_PATH.to_string(),
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            restricted_update: true,
            fill_year_tags: true,
            auto_confirm: false,
        }
    }
}

impl MirrorConfig {
    pub fn music_root(&self) -> PathBuf {
        expand_home(&self.music_root)
    }

    pub fn local_files_root(&self) -> PathBuf {
        expand_home(&self.local_files_root)
    }

    pub fn consolidated_root(&self) -> PathBuf {
        expand_home(&self.consolidated_root)
    }

    pub fn hash_cache_path(&self) -> PathBuf {
        expand_home(&self.hash_cache_path)
    }

    /// Client credentials, the environment taking precedence over the file.
    pub fn spotify_credentials(&self) -> (String, String) {
        (
            env_or(CLIENT_ID_ENV, &self.spotify_client_id),
            env_or(CLIENT_SECRET_ENV, &self.spotify_client_secret),
        )
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("playlist-mirror").join("config.yaml"),
        None => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(MirrorConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: MirrorConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.music_root.trim().is_empty() {
            config.music_root = DEFAULT_MUSIC_ROOT.to_string();
        }
        if config.local_files_root.trim().is_empty() {
            config.local_files_root = DEFAULT_LOCAL_FILES_ROOT.to_string();
        }
        if config.consolidated_root.trim().is_empty() {
            config.consolidated_root = DEFAULT_CONSOLIDATED_ROOT.to_string();
        }
        if config.hash_cache_path.trim().is_empty() {
            config.hash_cache_path = DEFAULT_HASH_CACHE_PATH.to_string();
        }
        if config.request_timeout_secs == 0 {
            config.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        return Ok((config, false));
    }

    let config = MirrorConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(value: &str) -> PathBuf {
    let trimmed = value.trim();
    let rest = match trimmed.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(trimmed),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(trimmed),
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.trim().to_string(),
    }
}
