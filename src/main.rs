//! Headless trading engine.
//!
//! Boots configuration, the database, the market-data and risk services,
//! the decision pipeline and the status API, then runs until interrupted.

use aegis_trader::application::system::Application;
use aegis_trader::config::Config;
use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("aegis-trader {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: symbols={:?}, strategy={}, timezone={}",
        config.symbols, config.strategy, config.timezone
    );

    let app = Application::build(config).await?;
    let running = app.start().await?;
    info!("Engine running. Press Ctrl+C to shut down.");

    tokio::signal::ctrl_c().await?;
    running.shutdown().await;
    Ok(())
}
