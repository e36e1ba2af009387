use anyhow::Result;
use dotenvy::dotenv;
use flightservice_forms::config::FormsConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter reads RUST_LOG.
    let dotenv_result = dotenv();
    init_tracing();
    match dotenv_result {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }

    let config = FormsConfig::from_env()?;
    info!(
        "Forms configured: from={}, to={}, site={}, token={:?}",
        config.email_from, config.email_to, config.site_url, config.token
    );
    flightservice_forms::app::run_server(config).await
}
