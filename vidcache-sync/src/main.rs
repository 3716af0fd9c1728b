//! vidcache-sync - media library synchronization service
//!
//! Keeps the SQLite video catalog in step with the configured video roots and
//! streams scan progress to clients over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidcache_common::config::{
    default_config_path, load_toml_config, parse_video_directories, resolve_root_folder, TomlConfig,
};
use vidcache_common::events::EventBus;
use vidcache_sync::services::{OrchestratorConfig, ScanOrchestrator, ScanScheduler};
use vidcache_sync::AppState;

const DEFAULT_LOG_FILTER: &str = "vidcache_sync=info,tower_http=info";
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for vidcache-sync
#[derive(Parser, Debug)]
#[command(name = "vidcache-sync")]
#[command(about = "Video catalog synchronization service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5750", env = "VIDCACHE_PORT")]
    port: u16,

    /// Folder holding vidcache.db and thumbnails/ (also VIDCACHE_ROOT_FOLDER)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Comma-separated video roots
    #[arg(long, env = "VIDEO_DIRECTORY")]
    video_directory: Option<String>,

    /// TOML config file (default: ~/.config/vidcache/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let (toml, toml_error) = match config_path.as_deref().map(load_toml_config) {
        Some(Ok(toml)) => (toml, None),
        Some(Err(e)) => (TomlConfig::default(), Some(e)),
        None => (TomlConfig::default(), None),
    };

    // Initialize tracing
    let default_filter = toml
        .logging
        .level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vidcache-sync on port {}", args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = toml_error {
        warn!("Ignoring unreadable config file: {}", e);
    }

    // Root folder: CLI → ENV → TOML → OS default
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "VIDCACHE_ROOT_FOLDER", &toml);
    let thumbnail_dir = root_folder.join("thumbnails");
    std::fs::create_dir_all(&thumbnail_dir)
        .with_context(|| format!("Failed to create {}", thumbnail_dir.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = root_folder.join("vidcache.db");
    let db_pool = vidcache_sync::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", db_path.display());

    // Video roots: CLI/ENV → TOML
    let video_roots = match args.video_directory.as_deref() {
        Some(raw) => parse_video_directories(raw),
        None => toml.video_directories.iter().map(PathBuf::from).collect(),
    };
    if video_roots.is_empty() {
        warn!("No video directories configured; scans will find nothing");
    }
    for root in &video_roots {
        info!("Video root: {}", root.display());
    }

    let ffprobe_path = args
        .ffprobe
        .or_else(|| toml.ffprobe_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("ffprobe"));
    let ffmpeg_path = args
        .ffmpeg
        .or_else(|| toml.ffmpeg_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));

    let scan_settings = vidcache_sync::config::resolve_scan_settings(&db_pool, &toml).await?;
    let schedule_settings = vidcache_sync::config::resolve_schedule_settings(&db_pool, &toml).await?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        OrchestratorConfig {
            video_roots,
            ffprobe_path,
            ffmpeg_path,
            thumbnail_dir,
        },
        scan_settings,
    ));

    let scheduler = Arc::new(ScanScheduler::new(
        db_pool.clone(),
        Arc::clone(&orchestrator),
        schedule_settings,
    ));
    let scheduler_task = scheduler.start();

    let mut state = AppState::new(db_pool, event_bus, orchestrator, Arc::clone(&scheduler));
    if let Some(path) = config_path {
        state = state.with_config_path(path);
    }

    let app = vidcache_sync::build_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.shutdown();
    let _ = scheduler_task.await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
