//! statwatch_agent: samples this host and serves windowed stats and a long-polled task list over WebSocket.

mod config;
mod sampler;
mod state;
mod store;
mod tasks;
mod types;
mod ws;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{auth_token, long_poll_timeout, parse_port, sample_interval, samples_count, DEFAULT_PORT};
use crate::sampler::spawn_sampler;
use crate::state::AppState;
use crate::ws::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!(
            "Usage: {} [--port PORT|-p PORT]\n\nEnvironment:\n  STATWATCH_AGENT_INTERVAL_MS  sample period (default 1000)\n  STATWATCH_AGENT_SAMPLES      samples per window (default 60)\n  STATWATCH_AGENT_LONGPOLL_SECS  task long-poll timeout (default 20)\n  STATWATCH_AGENT_TOKEN        require ?token= on connect",
            args.first().map(String::as_str).unwrap_or("statwatch_agent")
        );
        return Ok(());
    }
    let port = parse_port(args, DEFAULT_PORT);

    let state = AppState::new(samples_count(), sample_interval(), long_poll_timeout(), auth_token());
    let _sampler = spawn_sampler(state.clone(), sample_interval());

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        host = %state.hostname,
        samples = samples_count(),
        interval_ms = sample_interval().as_millis() as u64,
        auth = state.auth_token.is_some(),
        "agent listening on ws://{addr}/ws"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
