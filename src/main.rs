//! Main entry point for the anycards relay.

use anycards_relay::{cli, config, server};

use anyhow::Context;
use clap::Parser;
use config::Config;
use server::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Parse CLI args, load config and run the relay.
///
/// Usage:
///   anycards-relay [--config PATH] [--port N] [--debug] [--persist]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::ServerCli::parse();

    // Debug: everything at DEBUG with source locations.
    // Otherwise: our crate at INFO, everything else at WARN.
    let log_filter = if cli.debug {
        "debug".to_string()
    } else {
        "anycards_relay=info,warn".to_string()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(cli.debug)
        .with_thread_ids(cli.debug)
        .with_file(cli.debug)
        .with_line_number(cli.debug)
        .init();

    let config_path: PathBuf = cli.config.clone();

    // Load or create config file (creates file if missing).
    let mut cfg = Config::load_or_create(&config_path)
        .with_context(|| format!("loading or creating config '{}'", config_path.display()))?;

    // Apply CLI overrides in-memory (non-persistent by default)
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    if cli.persist {
        cfg.save(&config_path)
            .with_context(|| format!("saving updated config '{}'", config_path.display()))?;
    }

    if cfg.admin_token.is_none() {
        tracing::warn!("no admin_token configured, /dump and /reset will refuse every caller");
    }

    tracing::info!(
        config = %config_path.display(),
        cleanup_period_secs = cfg.cleanup_period_secs,
        player_timeout_ticks = cfg.player_timeout_ticks(),
        formation_timeout_ticks = cfg.formation_timeout_ticks(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let state = AppState::new(cfg);

    server::run_server(addr, state).await?;
    Ok(())
}
