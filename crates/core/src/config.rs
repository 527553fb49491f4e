use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a CSV env value into trimmed, non-empty entries.
fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub gateway: GatewayConfig,
    pub redis: RedisConfig,
    pub mongodb: MongoConfig,
    pub broker: BrokerConfig,
    pub poller: PollerConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub reddit: RedditConfig,
    pub rss: RssConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PULSE_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = profiled_env_or("", "PULSE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            gateway: GatewayConfig::from_env_profiled(p),
            redis: RedisConfig::from_env_profiled(p),
            mongodb: MongoConfig::from_env_profiled(p),
            broker: BrokerConfig::from_env_profiled(p),
            poller: PollerConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            reddit: RedditConfig::from_env_profiled(p),
            rss: RssConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  gateway:  {}:{}", self.gateway.host, self.gateway.port);
        tracing::info!("  redis:    {}:{}, ttl={}s", self.redis.host, self.redis.port, self.redis.default_ttl_seconds);
        tracing::info!("  mongodb:  {}:{}, db={}", self.mongodb.host, self.mongodb.port, self.mongodb.database);
        tracing::info!(
            "  broker:   backend={}, topics={}/{}, workers={}",
            self.broker.backend,
            self.broker.content_raw_topic,
            self.broker.query_topic,
            self.broker.max_worker_count
        );
        tracing::info!("  poller:   interval={}s", self.poller.interval_seconds);
        tracing::info!("  llm:      provider={}", self.llm.provider);
        tracing::info!("  reddit:   configured={}", self.reddit.is_configured());
    }
}

// ── Gateway HTTP server ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl GatewayConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "GATEWAY_HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "GATEWAY_PORT", 8080),
        }
    }
}

// ── Redis (state store, dedup cache, stream broker) ───────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub default_ttl_seconds: u64,
}

impl RedisConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "REDIS_HOST", "localhost"),
            port: profiled_env_u16(p, "REDIS_PORT", 6379),
            default_ttl_seconds: profiled_env_u64(p, "REDIS_DEFAULT_TTL_SECONDS", 86_400),
        }
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

// ── MongoDB (article store) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl MongoConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "MONGODB_HOST", "localhost"),
            port: profiled_env_u16(p, "MONGODB_PORT", 27017),
            database: profiled_env_or(p, "MONGODB_DATABASE", "contentpulse"),
        }
    }

    pub fn connection_string(&self) -> String {
        format!("mongodb://{}:{}", self.host, self.port)
    }
}

// ── Broker ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// "redis" (streams) or "sqs".
    pub backend: String,
    pub content_raw_topic: String,
    pub query_topic: String,
    /// Handler pool size; also bounds in-flight messages per consumer.
    pub max_worker_count: u32,
    pub visibility_timeout_secs: u32,
    /// Bounded poll wait per fetch.
    pub poll_wait_secs: u32,
    /// Stream consumer group (redis backend).
    pub consumer_group: String,
    /// Per-process consumer name within the group (redis backend).
    pub consumer_name: String,
    /// Queue URLs keyed by topic (sqs backend).
    pub sqs_content_raw_queue_url: Option<String>,
    pub sqs_query_queue_url: Option<String>,
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub aws_endpoint_url: Option<String>,
}

impl BrokerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "BROKER_BACKEND", "redis"),
            content_raw_topic: profiled_env_or(p, "CONTENT_RAW_TOPIC", "content-raw"),
            query_topic: profiled_env_or(p, "QUERY_TOPIC", "query"),
            max_worker_count: profiled_env_u32(p, "MAX_WORKER_COUNT", 10),
            visibility_timeout_secs: profiled_env_u32(p, "VISIBILITY_TIMEOUT_SECS", 120),
            poll_wait_secs: profiled_env_u32(p, "POLL_WAIT_SECS", 1),
            consumer_group: profiled_env_or(p, "CONSUMER_GROUP", "contentpulse"),
            consumer_name: profiled_env_or(p, "CONSUMER_NAME", "worker-1"),
            sqs_content_raw_queue_url: profiled_env_opt(p, "SQS_CONTENT_RAW_QUEUE_URL"),
            sqs_query_queue_url: profiled_env_opt(p, "SQS_QUERY_QUEUE_URL"),
            aws_region: profiled_env_or(p, "AWS_REGION", "eu-west-1"),
            aws_access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            aws_session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            aws_endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    /// Resolve the SQS queue URL for a logical topic name.
    pub fn sqs_queue_url(&self, topic: &str) -> Option<&str> {
        if topic == self.content_raw_topic {
            self.sqs_content_raw_queue_url.as_deref()
        } else if topic == self.query_topic {
            self.sqs_query_queue_url.as_deref()
        } else {
            None
        }
    }
}

// ── Poller ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub interval_seconds: u64,
}

impl PollerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_seconds: profiled_env_u64(p, "POLL_INTERVAL_SECONDS", 300),
        }
    }
}

// ── LLM (OpenAI / Anthropic / Ollama) ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "ollama"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    /// Model id for the active provider (recorded on processed artifacts).
    pub fn active_model<'a>(&'a self, ollama: &'a OllamaConfig) -> &'a str {
        match self.provider.as_str() {
            "openai" => &self.openai_model,
            "anthropic" => &self.anthropic_model,
            _ => &ollama.model,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
        }
    }
}

// ── Reddit content source ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub subreddits: Vec<String>,
}

impl RedditConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            client_id: profiled_env_opt(p, "REDDIT_CLIENT_ID"),
            client_secret: profiled_env_opt(p, "REDDIT_CLIENT_SECRET"),
            user_agent: profiled_env_or(p, "REDDIT_USER_AGENT", "contentpulse/0.1"),
            subreddits: split_csv(&profiled_env_or(
                p,
                "REDDIT_SUBREDDITS",
                "soccer,nba,nfl,formula1",
            )),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

// ── RSS content sources ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    pub espn_feeds: Vec<String>,
    pub bbc_feeds: Vec<String>,
    pub athletic_feeds: Vec<String>,
}

impl RssConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            espn_feeds: split_csv(&profiled_env_or(p, "RSS_ESPN_FEEDS", "")),
            bbc_feeds: split_csv(&profiled_env_or(p, "RSS_BBC_FEEDS", "")),
            athletic_feeds: split_csv(&profiled_env_or(p, "RSS_ATHLETIC_FEEDS", "")),
        }
    }

    /// (source name, feed URLs) pairs for every non-empty feed group.
    pub fn feed_groups(&self) -> Vec<(&'static str, &[String])> {
        let mut groups: Vec<(&'static str, &[String])> = Vec::new();
        if !self.espn_feeds.is_empty() {
            groups.push(("espn", &self.espn_feeds));
        }
        if !self.bbc_feeds.is_empty() {
            groups.push(("bbc_sport", &self.bbc_feeds));
        }
        if !self.athletic_feeds.is_empty() {
            groups.push(("the_athletic", &self.athletic_feeds));
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv_trims_and_drops_empty() {
        assert_eq!(
            split_csv(" soccer, nba ,,nfl "),
            vec!["soccer".to_string(), "nba".to_string(), "nfl".to_string()]
        );
        assert!(split_csv("").is_empty());
        assert!(split_csv(" , ,").is_empty());
    }

    #[test]
    fn test_redis_url() {
        let cfg = RedisConfig {
            host: "cache.internal".into(),
            port: 6380,
            default_ttl_seconds: 60,
        };
        assert_eq!(cfg.url(), "redis://cache.internal:6380");
    }

    #[test]
    fn test_mongo_connection_string() {
        let cfg = MongoConfig {
            host: "db.internal".into(),
            port: 27018,
            database: "contentpulse".into(),
        };
        assert_eq!(cfg.connection_string(), "mongodb://db.internal:27018");
    }

    #[test]
    fn test_sqs_queue_url_lookup() {
        let mut cfg = BrokerConfig {
            backend: "sqs".into(),
            content_raw_topic: "content-raw".into(),
            query_topic: "query".into(),
            max_worker_count: 10,
            visibility_timeout_secs: 120,
            poll_wait_secs: 1,
            consumer_group: "contentpulse".into(),
            consumer_name: "worker-1".into(),
            sqs_content_raw_queue_url: Some("https://sqs/content".into()),
            sqs_query_queue_url: Some("https://sqs/query".into()),
            aws_region: "eu-west-1".into(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            aws_endpoint_url: None,
        };
        assert_eq!(cfg.sqs_queue_url("content-raw"), Some("https://sqs/content"));
        assert_eq!(cfg.sqs_queue_url("query"), Some("https://sqs/query"));
        assert_eq!(cfg.sqs_queue_url("unknown"), None);

        cfg.sqs_query_queue_url = None;
        assert_eq!(cfg.sqs_queue_url("query"), None);
    }

    #[test]
    fn test_rss_feed_groups_skip_empty() {
        let cfg = RssConfig {
            espn_feeds: vec!["https://espn.example/rss".into()],
            bbc_feeds: vec![],
            athletic_feeds: vec!["https://athletic.example/a".into()],
        };
        let groups = cfg.feed_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "espn");
        assert_eq!(groups[1].0, "the_athletic");
    }

    #[test]
    fn test_llm_active_model_per_provider() {
        let ollama = OllamaConfig {
            url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
        };
        let mut llm = LlmConfig {
            provider: "openai".into(),
            openai_api_key: Some("sk-test".into()),
            openai_model: "gpt-4o-mini".into(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-5-20250929".into(),
            max_tokens: 4096,
        };
        assert_eq!(llm.active_model(&ollama), "gpt-4o-mini");
        llm.provider = "ollama".into();
        assert_eq!(llm.active_model(&ollama), "llama3.2");
    }
}
