use crate::server::state::AppState;
use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;

pub mod handler;
pub mod state;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health_check))
        .route("/metrics", get(handler::metrics))
        .with_state(state)
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let server = &state.configuration.server;
    let address = SocketAddr::new(server.address, server.port);

    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for the shutdown signal"),
    }
}
