pub mod reddit;
pub mod rss;

use std::sync::Arc;

use tracing::{info, warn};

use pulse_core::config::Config;

use crate::source::ContentSource;

pub use reddit::RedditSource;
pub use rss::RssSource;

/// Build every content source enabled by configuration.
pub fn build_content_sources(config: &Config) -> Vec<Arc<dyn ContentSource>> {
    let mut sources: Vec<Arc<dyn ContentSource>> = Vec::new();

    if config.reddit.is_configured() {
        let reddit = &config.reddit;
        sources.push(Arc::new(RedditSource::new(
            reddit.client_id.clone().unwrap_or_default(),
            reddit.client_secret.clone().unwrap_or_default(),
            reddit.user_agent.clone(),
            reddit.subreddits.clone(),
        )));
        info!(subreddits = reddit.subreddits.len(), "reddit source enabled");
    } else {
        warn!("reddit source not configured, skipping");
    }

    for (name, feeds) in config.rss.feed_groups() {
        sources.push(Arc::new(RssSource::new(name, feeds.to_vec())));
        info!(source = name, feeds = feeds.len(), "rss source enabled");
    }

    sources
}
