// src/config.rs
//! Process configuration: environment variables plus an optional category file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::notify::telegram::DEFAULT_API_BASE;

pub const ENV_CATEGORIES_PATH: &str = "RELAY_CATEGORIES_PATH";
pub const DEFAULT_FEED_URL: &str = "https://techcrunch.com/feed/";
pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_CATEGORIES: [&str; 7] = [
    "AI",
    "Robotics",
    "Tech Startups",
    "Biotech & Health",
    "Enterprise",
    "Security",
    "Privacy",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub port: u16,
    pub feed_url: String,
    pub telegram_api_base: String,
    pub poll_interval: Duration,
    pub send_delay: Duration,
    pub error_backoff: Duration,
    pub http_timeout: Duration,
    pub autostart: bool,
    pub categories: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            port: DEFAULT_PORT,
            feed_url: DEFAULT_FEED_URL.to_string(),
            telegram_api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_secs(300),
            send_delay: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            autostart: false,
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// On-disk allow-list: TOML `categories = [..]`, or JSON as either a bare
/// array or `{"categories": [..]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoryFile {
    Table { categories: Vec<String> },
    List(Vec<String>),
}

impl CategoryFile {
    fn parse(content: &str, ext: &str) -> Result<Self> {
        match ext {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            _ => serde_json::from_str(content)
                .or_else(|_| toml::from_str(content))
                .map_err(|_: toml::de::Error| anyhow!("unsupported categories format")),
        }
    }

    /// Trimmed, non-empty labels, first occurrence wins.
    fn into_labels(self) -> Vec<String> {
        let raw = match self {
            Self::Table { categories } | Self::List(categories) => categories,
        };
        let mut seen = BTreeSet::new();
        raw.into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && seen.insert(l.clone()))
            .collect()
    }
}

impl Settings {
    /// Read settings from the process environment and the category file.
    pub fn from_env() -> Result<Self> {
        let settings = Self::from_vars(|k| std::env::var(k).ok());
        match Self::category_file(std::env::var(ENV_CATEGORIES_PATH).ok())? {
            Some(path) => settings.with_category_file(&path),
            None => Ok(settings),
        }
    }

    /// Which category file applies:
    /// 1) an explicit path (must exist)
    /// 2) config/categories.toml
    /// 3) config/categories.json
    /// 4) none; the built-in set stays
    pub fn category_file(explicit: Option<String>) -> Result<Option<PathBuf>> {
        if let Some(p) = explicit {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Ok(Some(pb));
            }
            return Err(anyhow!("{ENV_CATEGORIES_PATH} points to non-existent path"));
        }
        Ok(["config/categories.toml", "config/categories.json"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists()))
    }

    /// Replace the allow-list with the labels in `path`.
    pub fn with_category_file(mut self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading categories from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.categories = CategoryFile::parse(&content, &ext)
            .with_context(|| format!("parsing categories from {}", path.display()))?
            .into_labels();
        Ok(self)
    }

    /// Build settings from an arbitrary variable lookup. Categories keep the
    /// built-in default; unparseable numbers fall back to defaults.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let text = |k: &str| var(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |k: &str, default: Duration| match text(k) {
            None => default,
            Some(v) => match v.parse::<u64>() {
                Ok(n) => Duration::from_secs(n),
                Err(_) => {
                    warn!(var = k, value = %v, "not a whole number of seconds; using default");
                    default
                }
            },
        };

        let port = match text("PORT") {
            None => d.port,
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(value = %v, "invalid PORT; using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
        };

        Self {
            bot_token: text("BOT_TOKEN"),
            chat_id: text("CHAT_ID"),
            port,
            feed_url: text("FEED_URL").unwrap_or(d.feed_url),
            telegram_api_base: text("TELEGRAM_API_BASE").unwrap_or(d.telegram_api_base),
            poll_interval: secs("POLL_INTERVAL_SECS", d.poll_interval),
            send_delay: secs("SEND_DELAY_SECS", d.send_delay),
            error_backoff: secs("ERROR_BACKOFF_SECS", d.error_backoff),
            http_timeout: secs("HTTP_TIMEOUT_SECS", d.http_timeout),
            autostart: text("RELAY_AUTOSTART").is_some_and(|v| v == "1"),
            categories: d.categories,
        }
    }

    /// Startup diagnostics. Never prints the token itself.
    pub fn log_summary(&self) {
        info!(
            "BOT_TOKEN: {}",
            if self.bot_token.is_some() { "set" } else { "not set" }
        );
        info!(
            "CHAT_ID: {}",
            if self.chat_id.is_some() { "set" } else { "not set" }
        );
        if self.bot_token.is_none() {
            warn!("BOT_TOKEN missing; deliveries will fail until it is configured");
        }
        if self.chat_id.is_none() {
            warn!("CHAT_ID missing; deliveries will fail until it is configured");
        }
        info!(
            feed = %self.feed_url,
            port = self.port,
            poll_secs = self.poll_interval.as_secs(),
            send_delay_secs = self.send_delay.as_secs(),
            backoff_secs = self.error_backoff.as_secs(),
            categories = ?self.categories,
            "settings loaded"
        );
    }
}
