//! Entry point for the constellation control API: loads the TOML
//! configuration, bootstraps the runtime and its background tasks, and
//! serves the HTTP surface.

mod config;
mod routes;
mod state;

use anyhow::Result;
use axum::routing::{get, put};
use axum::Router;
use clap::Parser;
use config::SimConfig;
use state::AppState;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "orbital-gateway", about = "LEO constellation control API")]
struct Args {
    /// Path to the simulation's TOML configuration file.
    #[arg(short, long, default_value = "sim.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = if args.config.exists() {
        SimConfig::load(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file found, using defaults");
        SimConfig::default()
    };

    info!(
        rings = config.rings,
        routers = config.routers,
        ground_stations = config.ground_stations,
        "bootstrapping constellation"
    );
    let state = AppState::bootstrap(&config)?;
    let shutdown_notify = state.shutdown_notify.clone();

    let app = Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/view/router/:name", get(routes::view_router))
        .route("/view/station/:name", get(routes::view_station))
        .route("/link", put(routes::set_link))
        .route("/uplinks", put(routes::set_uplinks))
        .route("/stats/total", get(routes::stats_total))
        .route("/shutdown", get(routes::shutdown))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_notify.notified().await })
        .await?;

    Ok(())
}
