use std::sync::Arc;

use product_mcp::{config::Config, stdio_service, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(&config));
    stdio_service::run(state).await
}
