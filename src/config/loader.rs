use std::{env, str::FromStr, time::Duration};

use url::Url;

use super::env::{
    AppConfig, ConfigError, DirectoryConfig, FeedTarget, FilterConfig, LoggingConfig,
    SchedulerConfig, SourceConfig,
};
use crate::tasks::stats::StatsWriteMode;

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let admin_user_id = parse_int("ADMIN_USER_ID");
        let admin_group_id = parse_int("ADMIN_GROUP_ID").map(|id| if id > 0 { -id } else { id });

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "feed-filter.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let timezone = env::var("BOT_TIMEZONE").unwrap_or_else(|_| "Asia/Seoul".to_string());

        let scheduler = SchedulerConfig {
            poll_crons: split_list("POLL_CRONS").unwrap_or_else(|| vec!["0 */2 * * * *".to_string()]),
        };

        let raw_base = env::var("REDDIT_BASE_URL")
            .unwrap_or_else(|_| "https://www.reddit.com".to_string());
        let base_url = Url::parse(&raw_base).map_err(|_| ConfigError::Invalid {
            key: "REDDIT_BASE_URL",
            value: raw_base.clone(),
        })?;
        let views = split_list("FEED_VIEWS")
            .unwrap_or_else(|| vec!["r/all".to_string()])
            .iter()
            .map(|raw| FeedTarget::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let source = SourceConfig {
            base_url,
            views,
            item_limit: parse_or("FEED_ITEM_LIMIT", 25)?,
            retain: parse_or("FEED_RETAIN", 200)?,
            fetch_timeout: Duration::from_millis(parse_or("FETCH_TIMEOUT", 10_000)?),
        };

        let filter = FilterConfig {
            default_pause: Duration::from_secs(parse_or::<u64>("PAUSE_MINUTES", 30)? * 60),
            stats_write_mode: parse_or("STATS_WRITE_MODE", StatsWriteMode::Serialized)?,
        };

        Ok(Self {
            telegram_bot_token,
            admin_user_id,
            admin_group_id,
            directories,
            logging,
            timezone,
            scheduler,
            source,
            filter,
        })
    }
}

fn parse_int(key: &str) -> Option<i64> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}

fn split_list(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env::var(key)
        .ok()?
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}
