use clap::Parser;
use log::{info, LevelFilter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use streamfx_core::core::api::ApiServer;
use streamfx_core::core::config::StreamFxSettings;
use streamfx_core::core::torrents::{FxSessionAdapter, TorrentEngine};

mod logger;

/// The interval on which idle torrents are evicted.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The local BitTorrent streaming engine for media players.
#[derive(Debug, Parser)]
#[command(name = "streamfx", version, about)]
struct StreamFxArgs {
    /// The loopback port on which the control api is served.
    #[arg(long)]
    port: Option<u16>,
    /// The root directory in which torrents are stored.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// The path to an optional yaml settings document.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// The root log level of the application.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = StreamFxArgs::parse();
    logger::init(args.log_level).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let mut settings = match args.settings.as_ref() {
        Some(path) => StreamFxSettings::from_file(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?,
        None => StreamFxSettings::default(),
    };
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        settings.torrent.directory = data_dir;
    }

    info!("Starting StreamFX with {}", settings);
    let session = Arc::new(FxSessionAdapter::new(&settings.torrent.directory));
    let engine = TorrentEngine::new(session, settings.torrent.clone())
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let server = ApiServer::new(engine.clone(), settings.server.port).await?;
    info!("Control api is available on http://{}", server.addr());

    let cleanup_engine = engine.clone();
    let max_age = Duration::from_secs(settings.torrent.cleanup_after_hours * 60 * 60);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            cleanup_engine.cleanup_idle(max_age).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping StreamFX");
    engine.shutdown().await;

    Ok(())
}
