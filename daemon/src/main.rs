mod adapter;
mod config;
mod ipc_server;
mod load_tracker;
mod macros;
mod player;
mod session;
mod sync;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "camsyncd")]
#[command(about = "Synchronized multi-camera playback daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (defaults to ~/.config/camsync/config.toml)
    #[arg(long, env = "CAMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Session manifest JSON to load at startup
    #[arg(long)]
    session: Option<PathBuf>,

    /// Override one camera source, e.g. --source TCBSC_back=/data/back.mp4
    #[arg(long = "source", value_name = "ID=SOURCE", value_parser = session::parse_source_override)]
    sources: Vec<(String, String)>,

    /// IPC socket path
    #[arg(long, env = "CAMSYNC_SOCKET")]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Without RUST_LOG the config's log level applies once it is loaded
    let env_filter = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !env_filter {
        log::set_max_level(log::LevelFilter::Info);
    }

    log::info!("Starting camsync daemon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::Config::default_config_path()?,
    };
    log::info!("Looking for config at: {}", config_path.display());
    let loaded = config::Config::load_from_path(&config_path);

    let config = match loaded {
        Ok(cfg) => {
            if !env_filter {
                log::set_max_level(cfg.general.level_filter());
            }
            log::info!("✓ Configuration loaded successfully");
            log::info!("  General settings:");
            log::info!("    - Log level: {}", cfg.general.log_level);
            log::info!("    - Backend: {}", cfg.general.backend);
            if let Some(ref root) = cfg.general.media_root {
                log::info!("    - Media root: {}", root);
            }
            log::info!("  Playback settings:");
            log::info!(
                "    - Frame rate: {} fps, skip step: {}s",
                cfg.playback.frame_rate,
                cfg.playback.seek_step
            );
            log::info!(
                "    - Load timeout: {}ms, ready timeout: {}ms",
                cfg.playback.load_timeout_ms,
                cfg.playback.ready_timeout_ms
            );
            if cfg.playback.watchdog {
                log::info!("    - Watchdog: every {}ms", cfg.playback.watchdog_interval_ms);
            } else {
                log::info!("    - Watchdog: disabled");
            }
            if !cfg.stream.is_empty() {
                log::info!("  Camera layout: {} configured stream(s)", cfg.stream.len());
            }
            if !cfg.sources.is_empty() {
                log::info!("  Source overrides: {}", cfg.sources.len());
            }
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            config::Config::default()
        }
    };

    // Session manifest: flag first, then config
    let session_path = args.session.clone().or_else(|| {
        config
            .general
            .session
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    });
    let manifest = match session_path {
        Some(path) => match session::load_manifest(&path).await {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                log::warn!("{:#}. Falling back to the configured layout.", e);
                None
            }
        },
        None => None,
    };

    let resolver = session::SourceResolver::new(&config, &args.sources);
    let descriptors = session::initial_descriptors(&config, manifest.as_ref(), &resolver);

    let backend = adapter::default_backend(&config);
    let mut player = player::Player::new(&config, backend, resolver);
    if let Err(e) = player.load(descriptors) {
        log::error!("Failed to load initial session: {}", e);
    }

    let (player_tx, player_rx) = mpsc::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Start IPC server
    let socket_path = args.socket.unwrap_or_else(common::get_socket_path);
    let ipc_shutdown = shutdown_tx.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(socket_path, player_tx, ipc_shutdown).await {
            log::error!("IPC server error: {:#}", e);
        }
    });

    // Start player loop
    let player_handle = tokio::spawn(player.run(player_rx, shutdown_rx));

    // Set up signal handlers
    let signal_shutdown = shutdown_tx.clone();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_shutdown.send_replace(true);
    });

    // The player detaches every stream before it returns
    if let Err(e) = player_handle.await {
        log::error!("Player task failed: {}", e);
    }
    shutdown_tx.send_replace(true);
    let _ = ipc_handle.await;

    log::info!("Daemon shutting down");
    Ok(())
}
