//! Main Entrypoint for the Aima API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the prompt set, with optional overrides from disk.
//! 3. Initializing the completion client.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Sweeping idle sessions in the background.
//! 6. Starting the web server and handling graceful shutdown.

use aima_api::{
    config::Config, router::create_router, state::AppState, sweeper::spawn_session_sweeper,
};
use aima_core::{CompletionClient, CompletionConfig, HttpCompletionClient, Prompts};
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Prompts ---
    let prompts = match &config.prompts_path {
        Some(path) => {
            info!(path = %path.display(), "Loading prompt overrides");
            Prompts::from_dir(path)?
        }
        None => Prompts::default(),
    };

    // --- 4. Initialize the Completion Client ---
    let client: Arc<dyn CompletionClient> = Arc::new(HttpCompletionClient::new(CompletionConfig {
        api_key: config.api_key.clone(),
        base_url: config.api_base_url.clone(),
        model: config.chat_model.clone(),
        timeout: config.request_timeout,
    })?);

    let app_state = Arc::new(AppState::new(client, Arc::new(prompts)));

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 6. Start the Idle Session Sweeper ---
    let sweeper_shutdown = CancellationToken::new();
    let sweeper = spawn_session_sweeper(
        app_state,
        config.session_idle,
        sweeper_shutdown.clone(),
    );

    // --- 7. Start Server ---
    info!(
        model = %config.chat_model,
        api_base = %config.api_base_url,
        timeout_secs = config.request_timeout.as_secs(),
        session_idle_secs = config.session_idle.as_secs(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper_shutdown.cancel();
    sweeper.await?;
    info!("Server has shut down.");
    Ok(())
}
