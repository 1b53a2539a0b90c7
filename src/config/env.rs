use std::{fmt, time::Duration};

use thiserror::Error;
use url::Url;

use crate::tasks::stats::StatsWriteMode;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub admin_user_id: Option<i64>,
    pub admin_group_id: Option<i64>,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: String,
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_crons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: Url,
    pub views: Vec<FeedTarget>,
    pub item_limit: usize,
    pub retain: usize,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub default_pause: Duration,
    pub stats_write_mode: StatsWriteMode,
}

/// A feed the bot keeps filtered: a subreddit listing or a search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedTarget {
    Subreddit(String),
    Search(String),
}

impl FeedTarget {
    /// `r/<name>` (or a bare name) for listings, `search:<query>` for search.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = || ConfigError::Invalid {
            key: "FEED_VIEWS",
            value: raw.to_string(),
        };
        if let Some(query) = raw.strip_prefix("search:") {
            let query = query.trim();
            if query.is_empty() {
                return Err(invalid());
            }
            return Ok(FeedTarget::Search(query.to_string()));
        }
        let name = raw
            .strip_prefix("/r/")
            .or_else(|| raw.strip_prefix("r/"))
            .unwrap_or(raw)
            .trim_matches('/');
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+');
        if !valid {
            return Err(invalid());
        }
        Ok(FeedTarget::Subreddit(name.to_string()))
    }

    pub fn is_search(&self) -> bool {
        matches!(self, FeedTarget::Search(_))
    }
}

impl fmt::Display for FeedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedTarget::Subreddit(name) => write!(f, "r/{name}"),
            FeedTarget::Search(query) => write!(f, "search:{query}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
