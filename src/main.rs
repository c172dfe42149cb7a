mod agent;
mod api;
mod config;
mod connections;
mod credentials;
mod dids;
mod error;
mod events;
mod flows;
mod jwt;
mod openid4vc;
mod wallet;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{AgentConfig, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // ── Configuration ───────────────────────────────────────────────────
    let config = AgentConfig::from_env()?;

    // ── Logging ─────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ssi_agent_demo=debug,tower_http=info".into());
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };
    tracing_subscriber::registry().with(filter).with(text).with(json).init();

    info!("SSI agent demo starting");

    // ── Agent ───────────────────────────────────────────────────────────
    let addr = config.socket_address();
    let public_url = config.public_url.clone();
    let state = agent::initialise(config).await?;

    // ── Axum router ─────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── Start server ────────────────────────────────────────────────────
    info!("Server listening on http://{addr}");
    info!("Public URL: {public_url}");
    info!("SSE stream: {public_url}/events/stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
