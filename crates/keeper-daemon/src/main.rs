mod diff;
mod error;
mod events;
mod guard;
mod picker;
mod player;
mod poll;
mod push;
mod reconciler;
mod shadow;
mod source;
mod store;
mod subscription;

use std::path::Path;
use std::sync::Arc;

use keeper_proto::config::{Config, SyncMode};
use keeper_proto::library;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::picker::LibraryPicker;
use crate::player::{PlayerApi, VolumioClient};
use crate::poll::PollSource;
use crate::push::PushSource;
use crate::reconciler::{Reconciler, Settings};
use crate::source::ChangeEventSource;
use crate::store::JsonSnapshotStore;

/// `{dir}/{stem}.YYYY-MM-DD.{ext}`, one file per day, oldest deleted past
/// `max_files`.
fn rolling_appender(log_path: &Path, max_files: usize) -> anyhow::Result<RollingFileAppender> {
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let prefix = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("daemon");
    let suffix = log_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("log");

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .max_log_files(max_files.max(1))
        .build(dir)?;
    Ok(appender)
}

/// Rotated file log (no colours) plus a stderr copy, filtered by
/// `RUST_LOG`.  The returned guard flushes the file writer on drop.
fn init_tracing(log_path: &Path, max_files: usize) -> anyhow::Result<WorkerGuard> {
    let appender = rolling_appender(log_path, max_files)?;
    let (log_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_writer)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,queue_keeper=debug")),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let _log_guard = init_tracing(&config.paths.log_file, config.paths.log_max_files)?;

    info!("Log file: {:?}", config.paths.log_file);
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = library::load_catalog(&config.paths.catalog_file)?;
    info!(
        "Fallback catalog: {} tracks from {:?}",
        catalog.len(),
        config.paths.catalog_file
    );

    let client = VolumioClient::new(&config.player.host);
    let player: Arc<dyn PlayerApi> = Arc::new(client.clone());
    info!("Player API: {}", client.url(""));

    let store = JsonSnapshotStore::new(&config.paths.snapshot_dir, chrono::Local::now());
    info!("Snapshots: {:?}", store.path());

    let settings = Settings {
        resume_after_removal: config.sync.resume_after_removal,
        echo_linger: config.sync.echo_linger(),
    };
    let mut reconciler = Reconciler::new(
        player.clone(),
        Box::new(store),
        LibraryPicker::new(catalog),
        settings,
    );
    let seeded = reconciler.seed().await?;
    let reconciler = reconciler.into_shared();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for ctrl-c: {}", e);
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        });
    }

    let source: Box<dyn ChangeEventSource> = match config.sync.mode {
        SyncMode::Push => Box::new(PushSource::bind(&config.callback).await?),
        SyncMode::Poll => Box::new(PollSource::new(
            player,
            config.sync.poll_interval(),
            Some(seeded),
        )),
    };

    let callback_url = config.callback_url();
    if config.sync.mode == SyncMode::Push {
        subscription::register(&client, &callback_url).await;
    }

    info!("Keeper initialised, {} source running", source.name());
    let result = source.run(reconciler, shutdown).await;

    if config.sync.mode == SyncMode::Push {
        subscription::unregister(&client, &callback_url).await;
    }
    result
}
