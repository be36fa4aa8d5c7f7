//! Routing and the server run loop.

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Json, Router,
};

use super::state::AppState;
use anyhow::{Context, Result};

pub const PATH_WEBSOCKET: &str = "/websocket";
pub const PATH_DUMP: &str = "/dump";
pub const PATH_RESET: &str = "/reset";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "ok": true })) }),
        )
        .route(PATH_WEBSOCKET, get(super::ws::ws_handler))
        .route(PATH_DUMP, post(super::admin::dump_handler))
        .route(PATH_RESET, post(super::admin::reset_handler))
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<()> {
    // Zero periods would panic the cleanup ticker and the ping interval.
    state.config.validate().context("invalid relay configuration")?;
    let app = build_router(state.clone());

    // Idle eviction runs for as long as the server does.
    tokio::spawn(super::cleanup::run_cleanup(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .await
        .with_context(|| "serving HTTP")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn refuses_to_start_with_zero_periods() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        for cfg in [
            Config {
                cleanup_period_secs: 0,
                ..Config::default()
            },
            Config {
                pong_wait_secs: 0,
                ..Config::default()
            },
        ] {
            let err = run_server(addr, AppState::new(cfg)).await.unwrap_err();
            assert!(err.to_string().contains("invalid relay configuration"));
        }
    }
}
