//! content-processor — consumes raw articles from the content-raw topic,
//! enriches them via LLM, and persists them to the article store.
//!
//! Pipeline flow: broker(content-raw) → analyzer → article store

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use pulse_analyzer::ContentAnalyzer;
use pulse_broker::{build_consumer, Dispatcher, MessageConsumer};
use pulse_core::config::{self, Config};
use pulse_llm::create_provider;
use pulse_store::MongoArticleStore;

/// Content processing worker.
#[derive(Parser, Debug)]
#[command(name = "content-processor", version, about)]
struct Cli {
    /// Shutdown timeout in seconds.
    #[arg(long, default_value_t = 10)]
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
    let llm: Arc<dyn pulse_llm::LlmProvider> =
        Arc::from(create_provider(&config.llm, &config.ollama)?);
    let model = config.llm.active_model(&config.ollama).to_string();

    let analyzer = Arc::new(ContentAnalyzer::new(articles, llm, model));
    let dispatcher = Arc::new(Dispatcher::new(
        analyzer,
        config.broker.max_worker_count as usize,
    ));

    let topic = config.broker.content_raw_topic.clone();
    let broker_consumer = build_consumer(&config.broker, &config.redis, &topic).await?;
    let consumer = Arc::new(MessageConsumer::new(
        &topic,
        broker_consumer,
        dispatcher.clone(),
        config.broker.visibility_timeout_secs,
    ));

    let run = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.run().await }
    });

    info!("content-processor started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    consumer.close();
    dispatcher.close();
    let _ = tokio::time::timeout(Duration::from_secs(cli.shutdown_timeout), run).await;
    info!("content-processor exited cleanly");
    Ok(())
}
