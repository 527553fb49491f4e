//! gateway — HTTP entry point for query submission and status polling.
//!
//! Pipeline flow: client → gateway → state store + broker(query)

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pulse_broker::build_publisher;
use pulse_core::config::{self, Config};
use pulse_gateway::{router, AppState};
use pulse_store::RedisStateStore;

/// Gateway HTTP service.
#[derive(Parser, Debug)]
#[command(name = "gateway", version, about)]
struct Cli {
    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
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

    let state_store = Arc::new(
        RedisStateStore::connect(&config.redis.url(), config.redis.default_ttl_seconds).await?,
    );
    let publisher = build_publisher(&config.broker, &config.redis).await?;

    let state = Arc::new(AppState::new(
        state_store,
        publisher,
        config.broker.query_topic.clone(),
    ));
    let app = router(state);

    let port = cli.port.unwrap_or(config.gateway.port);
    let addr = format!("{}:{}", config.gateway.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("gateway exited cleanly");
    Ok(())
}
