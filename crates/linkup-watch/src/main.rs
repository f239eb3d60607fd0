//! # Linkup Watch
//!
//! Holds the shared realtime connection for one credential and logs what the
//! server pushes: notifications, connection requests and presence changes.
//!
//! ## Usage
//!
//! ```bash
//! # Credential from the environment
//! LINKUP_TOKEN=... linkup-watch
//!
//! # Custom endpoint
//! LINKUP_URL=wss://api.example.com/ws LINKUP_TOKEN=... linkup-watch
//! ```

mod config;
mod metrics;
mod watch;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkup=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Watching {}", config.sync.realtime.url);

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    watch::run(config).await
}
