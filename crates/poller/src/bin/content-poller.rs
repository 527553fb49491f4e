//! content-poller — periodically fetches content from configured sources and
//! feeds new articles into the processing pipeline.
//!
//! Pipeline flow: content sources → dedup → broker(content-raw)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use pulse_broker::build_publisher;
use pulse_core::config::{self, Config};
use pulse_poller::{build_content_sources, Ingester, Poller};
use pulse_store::{DedupCache, MongoArticleStore, RedisDedupCache};

/// Content poller worker.
#[derive(Parser, Debug)]
#[command(name = "content-poller", version, about)]
struct Cli {
    /// Override the poll interval in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Shutdown timeout in seconds.
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let articles = Arc::new(MongoArticleStore::connect(&config.mongodb).await?);

    // The dedup cache is an optimization; run without it if redis is down.
    let dedup: Option<Arc<dyn DedupCache>> =
        match RedisDedupCache::connect(&config.redis.url()).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "dedup cache unavailable, falling back to store-only checks");
                None
            }
        };

    let publisher = build_publisher(&config.broker, &config.redis).await?;

    let sources = build_content_sources(&config);
    anyhow::ensure!(!sources.is_empty(), "no content sources configured");

    let ingester = Arc::new(Ingester::new(
        articles,
        publisher,
        dedup,
        config.broker.content_raw_topic.clone(),
    ));
    let interval = Duration::from_secs(cli.interval.unwrap_or(config.poller.interval_seconds));
    let poller = Arc::new(Poller::new(sources, ingester, interval));

    let run = tokio::spawn({
        let poller = Arc::clone(&poller);
        async move { poller.run().await }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    poller.stop();
    let _ = tokio::time::timeout(Duration::from_secs(cli.shutdown_timeout), run).await;
    info!("content-poller exited cleanly");
    Ok(())
}
