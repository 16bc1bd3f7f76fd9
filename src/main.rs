//! scrollharvest - harvest infinite-scroll listings as JSON lines.

mod cli;

#[cfg(feature = "browser")]
use scrollharvest::browser;
use scrollharvest::{config, error, harvest, models};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "scrollharvest=info"
    } else {
        "scrollharvest=warn"
    };

    // stdout carries records, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run().await
}
