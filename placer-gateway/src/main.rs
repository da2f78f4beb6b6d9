use anyhow::{Context, Result};
use placer_gateway::{AppState, GatewayConfig, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placer_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Placer Gateway...");

    let config = GatewayConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    tracing::info!(
        "Serving access point '{}' from {}",
        config.access_point,
        config.spool_dir.display()
    );
    if config.token_file.is_none() {
        tracing::warn!("No GATEWAY_TOKEN_FILE set; any token is accepted on {}", config.bind_addr);
    }

    let app = create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
