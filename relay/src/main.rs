//! Realtime relay for shared boards.
//!
//! Groups websocket connections into rooms by path and fans binary frames
//! out to the other members of each room. Frame bodies are never
//! interpreted; see the `frames` crate for the wire format.

mod config;
mod routes;
mod services;
mod state;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::RelayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "relay=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    config.validate()?;

    let addr = config.listen_addr();
    let grace_ms = config.room_grace.as_millis();
    let state = state::AppState::new(config);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %grace_ms, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
