//! Racer Server - Authoritative multiplayer racing server
//!
//! This is the main entry point for the race server. It handles:
//! - WebSocket connections for real-time gameplay
//! - The fixed-step simulation session
//! - HTTP health reporting

use std::net::SocketAddr;

use rand::RngCore;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use racer_server::app::AppState;
use racer_server::config::Config;
use racer_server::game::GameSession;
use racer_server::http::build_router;
use racer_server::util::time::init_server_time;
use racer_server::ws::protocol::WorldDescriptor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Racer Server");
    info!("Server address: {}", config.server_addr);

    // Spawn the simulation session
    let seed = config
        .world_seed
        .unwrap_or_else(|| rand::thread_rng().next_u64());
    info!(seed, "World seed");
    let (session, handle) = GameSession::new(WorldDescriptor::default(), seed);
    tokio::spawn(session.run());

    // Create application state
    let state = AppState::new(config.clone(), handle.clone());

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the simulation loop before exiting
    handle.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
