use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "playlist-mirror", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Config file (defaults to $PLAYLIST_MIRROR_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to every prompt
    #[arg(long, global = true)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror one playlist into its directory and reconcile the ledger
    Extract {
        /// Spotify playlist URL
        url: String,
    },

    /// Sync duplicates across playlists and report on the whole library
    Consolidate {
        /// Refresh every playlist manifest from Spotify first
        #[arg(long)]
        refresh: bool,

        /// Skip merging into the consolidated library
        #[arg(long)]
        no_merge: bool,
    },

    /// Reconcile one directory against a JSON track list, offline
    Reconcile {
        /// Playlist directory
        dir: PathBuf,

        /// JSON array of tracks ({"remote_id","artist","title",...})
        #[arg(long)]
        tracks: PathBuf,
    },
}
