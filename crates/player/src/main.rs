mod commands;
mod config;

use std::env;

use common::{Handle, ScanProgress};
use library::{ColdStart, MediaLibrary};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use commands::Command;
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = Command::parse(env::args().skip(1))?;

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let music_root = resolve_music_root(&config_path, &config.music_root)
        .ok_or("music_root is not set; edit the config file and retry")?;
    let cache_path = resolve_path(&config_path, &config.cache_path);
    let library = MediaLibrary::open_local(&cache_path, config.scan_options())?;
    let root = Handle::from_path(&music_root);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(progress_rx));
    let outcome = if command.force_rescan() {
        library
            .rescan(&root, config.scan_limit, Some(&progress_tx), &cancel)
            .await
    } else {
        library
            .restore_or_scan(&root, config.scan_limit, Some(&progress_tx), &cancel)
            .await
    };
    drop(progress_tx);
    if let Err(err) = reporter.await {
        warn!("Progress reporter failed: {}", err);
    }

    match outcome? {
        ColdStart::Restored { files, playlists } => {
            info!("Library restored: {} songs, {} playlists", files, playlists);
        }
        ColdStart::Scanned(stats) => info!(
            "Library scanned: {} songs in {} folders ({}ms)",
            stats.files_found, stats.folders_visited, stats.elapsed_ms
        ),
        ColdStart::Interrupted(stats) => {
            warn!(
                "Scan interrupted after {} songs; results were not saved",
                stats.files_found
            );
            return Ok(());
        }
    }

    commands::run(&library, command)
}

async fn report_progress(mut progress: UnboundedReceiver<ScanProgress>) {
    while let Some(update) = progress.recv().await {
        info!(
            "Scanning: {} songs found, {} folders visited",
            update.files_found, update.folders_visited
        );
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            return;
        }
    }

    info!("Interrupt received; cancelling scan.");
    cancel.cancel();
}
