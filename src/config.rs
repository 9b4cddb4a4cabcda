use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u32,

    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,

    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,

    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,

    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,

    #[serde(default = "default_source_concurrency")]
    pub source_concurrency: usize,

    /// Fetch each new article's page for full text.
    #[serde(default = "default_true")]
    pub enrich_content: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newsdesk");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("news.db").to_string_lossy().to_string()
}

fn default_update_interval() -> u32 {
    30
}

fn default_max_articles() -> usize {
    50
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_page_timeout() -> u64 {
    20
}

fn default_content_max_chars() -> usize {
    5000
}

fn default_description_max_chars() -> usize {
    1000
}

fn default_source_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            update_interval_minutes: default_update_interval(),
            max_articles_per_source: default_max_articles(),
            feed_timeout_secs: default_feed_timeout(),
            page_timeout_secs: default_page_timeout(),
            content_max_chars: default_content_max_chars(),
            description_max_chars: default_description_max_chars(),
            source_concurrency: default_source_concurrency(),
            enrich_content: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the TOML config (writing defaults on first run), then apply
    /// environment overrides. A `.env` file in the working directory is read
    /// first when present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = Self::config_path();
        let config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newsdesk")
            .join("config.toml")
    }

    /// Apply overrides from `lookup` (normally the process environment) and
    /// validate the result.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("NEWSDESK_DB_PATH").or_else(|| lookup("DATABASE_URL")) {
            self.db_path = path.trim_start_matches("sqlite://").to_string();
        }
        override_parsed(&lookup, "UPDATE_INTERVAL_MINUTES", &mut self.update_interval_minutes)?;
        override_parsed(&lookup, "MAX_ARTICLES_PER_SOURCE", &mut self.max_articles_per_source)?;
        override_parsed(&lookup, "FEED_TIMEOUT_SECS", &mut self.feed_timeout_secs)?;
        override_parsed(&lookup, "PAGE_TIMEOUT_SECS", &mut self.page_timeout_secs)?;
        override_parsed(&lookup, "CONTENT_MAX_CHARS", &mut self.content_max_chars)?;
        override_parsed(&lookup, "DESCRIPTION_MAX_CHARS", &mut self.description_max_chars)?;
        override_parsed(&lookup, "SOURCE_CONCURRENCY", &mut self.source_concurrency)?;
        override_parsed(&lookup, "ENRICH_CONTENT", &mut self.enrich_content)?;
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.update_interval_minutes == 0 {
            return Err(AppError::Config("update_interval_minutes must be at least 1".into()));
        }
        if self.feed_timeout_secs == 0 || self.page_timeout_secs == 0 {
            return Err(AppError::Config("timeouts must be at least 1 second".into()));
        }
        if self.source_concurrency == 0 {
            return Err(AppError::Config("source_concurrency must be at least 1".into()));
        }
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("database path is empty".into()));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.update_interval_minutes) * 60)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw:?}")))?;
    }
    Ok(())
}
