//! Reddit content source.
//!
//! Authenticates with the client-credentials grant and polls the hot listing
//! of each configured subreddit. The bearer token is cached until shortly
//! before expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use pulse_core::content::RawArticle;

use crate::source::{http_client, ContentSource, SourceError};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const LISTING_LIMIT: u32 = 25;
/// Refresh the token this long before it actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct RedditSource {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    user_agent: String,
    subreddits: Vec<String>,
    token: Mutex<Option<CachedToken>>,
}

impl RedditSource {
    pub fn new(
        client_id: String,
        client_secret: String,
        user_agent: String,
        subreddits: Vec<String>,
    ) -> Self {
        Self {
            client: http_client(),
            client_id,
            client_secret,
            user_agent,
            subreddits,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.token.clone());
            }
        }

        debug!("fetching reddit access token");
        let resp = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("User-Agent", &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Auth(format!(
                "reddit token request failed: {status} — {body}"
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| SourceError::Auth("missing access_token in response".into()))?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);

        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}

/// Turn one `/r/<sub>/hot` listing document into articles newer than `since`.
fn parse_listing(
    subreddit: &str,
    listing: &serde_json::Value,
    since: Option<DateTime<Utc>>,
) -> Vec<RawArticle> {
    let children = match listing["data"]["children"].as_array() {
        Some(children) => children,
        None => return vec![],
    };

    let mut articles = Vec::new();
    for child in children {
        let data = &child["data"];
        let id = match data["id"].as_str() {
            Some(id) => id,
            None => continue,
        };

        let created = data["created_utc"]
            .as_f64()
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or_else(Utc::now);
        if let Some(since) = since {
            if created <= since {
                continue;
            }
        }

        let selftext = data["selftext"].as_str().unwrap_or_default();
        let url = data["url"].as_str().unwrap_or_default();
        let content = if selftext.is_empty() { url } else { selftext };
        let permalink = data["permalink"].as_str().unwrap_or_default();

        articles.push(RawArticle {
            source: "reddit".to_string(),
            source_id: id.to_string(),
            source_url: format!("https://reddit.com{permalink}"),
            title: data["title"].as_str().unwrap_or_default().to_string(),
            content: content.to_string(),
            published_at: created,
            metadata: [
                ("subreddit".to_string(), serde_json::json!(subreddit)),
                ("score".to_string(), data["score"].clone()),
                ("num_comments".to_string(), data["num_comments"].clone()),
                (
                    "author".to_string(),
                    serde_json::json!(data["author"].as_str().unwrap_or_default()),
                ),
            ]
            .into_iter()
            .collect(),
        });
    }

    articles
}

#[async_trait]
impl ContentSource for RedditSource {
    async fn fetch_latest(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, SourceError> {
        let token = self.access_token().await?;
        let mut results = Vec::new();

        for subreddit in &self.subreddits {
            let url = format!("{API_BASE}/r/{subreddit}/hot?limit={LISTING_LIMIT}");
            let listing: serde_json::Value = match self
                .client
                .get(&url)
                .bearer_auth(&token)
                .header("User-Agent", &self.user_agent)
                .send()
                .await
            {
                Ok(resp) => match resp.json().await {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(subreddit, error = %e, "failed to decode subreddit listing");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(subreddit, error = %e, "failed to fetch subreddit");
                    continue;
                }
            };

            results.append(&mut parse_listing(subreddit, &listing, since));
        }

        Ok(results)
    }

    fn source_name(&self) -> &str {
        "reddit"
    }
}
