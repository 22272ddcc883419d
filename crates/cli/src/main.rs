mod args;
mod config;
mod consolidate;
mod extract;
mod prompt;
mod spotify;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::TrackRecord;
use library::{reconcile_directory, AutoConfirm, Confirm, ReconcileOptions};
use tracing::{info, warn};

use args::{Args, Command};
use config::{config_path_from_env, load_or_create_config, MirrorConfig};
use consolidate::{run_consolidate, ConsolidateOptions};
use extract::run_extract;
use prompt::TerminalConfirm;
use spotify::SpotifyClient;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config_path_from_env);
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", err);
    }

    let auto_confirm = args.yes || config.auto_confirm;
    let confirm: &dyn Confirm = if auto_confirm {
        &AutoConfirm
    } else {
        &TerminalConfirm
    };

    match args.cmd {
        Command::Extract { url } => {
            let client = connect(&config)?;
            run_extract(&config, &url, &client, confirm)?;
        }
        Command::Consolidate { refresh, no_merge } => {
            let client = if refresh { Some(connect(&config)?) } else { None };
            let options = ConsolidateOptions {
                refresh: client.as_ref().map(|client| client as &dyn library::PlaylistSource),
                merge: !no_merge,
                auto_confirm,
            };
            run_consolidate(&config, &options, confirm, &stop)?;
        }
        Command::Reconcile { dir, tracks } => {
            reconcile_offline(&config, &dir, &tracks)?;
        }
    }
    Ok(())
}

fn connect(config: &MirrorConfig) -> Result<SpotifyClient, library::SourceError> {
    let (client_id, client_secret) = config.spotify_credentials();
    SpotifyClient::connect(
        &client_id,
        &client_secret,
        Duration::from_secs(config.request_timeout_secs),
    )
}

fn reconcile_offline(
    config: &MirrorConfig,
    dir: &Path,
    tracks: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<TrackRecord> = serde_json::from_slice(&fs::read(tracks)?)?;
    let options = ReconcileOptions {
        restricted_update: config.restricted_update,
    };
    let report = reconcile_directory(dir, &records, &options)?;
    println!(
        "kept {}, dropped {}, added {}, flipped {}, deduped {}, appended {}, promoted {}, ambiguous {}",
        report.cleanup.kept,
        report.cleanup.dropped_orphans,
        report.ids.added,
        report.ids.flipped,
        report.ids.deduped,
        report.restricted.len(),
        report.promotion.renamed.len(),
        report.promotion.ambiguous.len()
    );
    Ok(())
}
