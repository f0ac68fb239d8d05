// EchoVault - Terminal Music Player
// Watches your music folders, plays them in order (or not), remembers what you liked.

use anyhow::{Context, Result};
use clap::Parser;
use echovault::audio::RodioEngine;
use echovault::ui::App;
use echovault::{Config, Controller, MetadataStore, PlaybackSession};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "echovault", version, about = "Terminal music player")]
struct Args {
    /// Also log to stderr
    #[arg(long)]
    dev: bool,

    /// Use this config file instead of the default one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run without the SQLite store (no likes or play counts)
    #[arg(long)]
    no_store: bool,

    /// Extra music directories to watch for this session
    directories: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config - falls back to defaults if missing
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let _guard = init_logging(&config.log_dir, args.dev)?;
    info!("Starting EchoVault v{}", env!("CARGO_PKG_VERSION"));

    let store = if args.no_store {
        None
    } else {
        match MetadataStore::open(&config.database_path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Metadata store unavailable ({}), continuing without it", e);
                None
            }
        }
    };

    let engine = RodioEngine::new(config.audio.clone()).context("opening audio output")?;
    let session = PlaybackSession::new(engine, config.audio.volume);
    let mut controller = Controller::new(session, store, config.audio.volume_step);

    for directory in config.music_directories.iter().chain(&args.directories) {
        match controller.add_directory(directory) {
            Ok(report) => info!("Watching {} ({} tracks)", directory.display(), report.added),
            Err(e) => error!("Skipping {}: {}", directory.display(), e),
        }
    }

    let app = App::new(controller, config.monitor.clone())?;
    app.run().await
}

/// Daily-rolling file log; `--dev` mirrors it to stderr.
fn init_logging(log_dir: &Path, dev: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "echovault.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,echovault=debug"));

    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(stderr_layer)
        .init();

    Ok(guard)
}
