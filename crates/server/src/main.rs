//! receiptscan REST API server
//!
//! Accepts a receipt or invoice image and returns the structured data a
//! vision-language model reads from it.

mod config;
mod error;
mod fetch;
mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use config::{BackendKind, Config};
use llm_bridge::{
    GeminiConfig, GeminiVision, ModelGateway, OllamaClient, OllamaConfig, OllamaVision,
    VisionBackend,
};
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    let backend = build_backend(&config)?;
    let gateway = ModelGateway::new(backend, config.generation_settings());
    let preload = config.preload_model;
    let addr = config.bind_addr();
    let state = AppState::new(config, gateway)?;

    tracing::info!(
        model = %state.config().model_name,
        backend = %state.config().backend,
        "Starting receipt scanner service on {}",
        addr
    );

    if preload {
        tracing::info!("Preloading model...");
        match state.gateway().ensure_loaded().await {
            Ok(info) => tracing::info!(model = %info.name, details = ?info.details, "Model ready"),
            Err(e) => tracing::warn!(error = %e, "Preload failed; will retry on first request"),
        }
    }

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

fn build_backend(config: &Config) -> Result<Arc<dyn VisionBackend>> {
    let backend: Arc<dyn VisionBackend> = match config.backend {
        BackendKind::Ollama => Arc::new(OllamaVision::new(OllamaClient::new(OllamaConfig {
            base_url: config.ollama_url.clone(),
            timeout_secs: None,
        })?)),
        BackendKind::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY must be set when MODEL_BACKEND=gemini")?;
            Arc::new(GeminiVision::new(GeminiConfig::new(api_key))?)
        }
    };
    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
