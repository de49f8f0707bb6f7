use std::sync::Arc;
use tracing::info;

use product_mcp::{config::Config, mcp, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    info!("Starting product MCP server");
    info!("Default platform: {}", config.default_platform);
    info!(
        "Cache TTL: {}s, navigation timeout: {}ms",
        config.cache_ttl.as_secs(),
        config.browser.navigation_timeout.as_millis()
    );

    let state = Arc::new(AppState::new(&config));
    let app = mcp::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("MCP Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
