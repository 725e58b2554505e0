// src/feed/client.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;

use crate::feed::types::FeedSource;

/// Fetches the feed over HTTP GET with a bounded timeout. No retries.
#[derive(Clone)]
pub struct HttpFeed {
    url: String,
    client: Client,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feed-relay-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<String> {
        let resp = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                counter!("relay_feed_errors_total").increment(1);
                return Err(e).context("feed http get()");
            }
        };
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                counter!("relay_feed_errors_total").increment(1);
                return Err(e).context("feed non-2xx");
            }
        };
        resp.text().await.context("feed http .text()")
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// Serves a fixed document; used for fixtures and offline dry runs.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    body: String,
}

impl StaticFeed {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading feed from {}", path.display()))?;
        Ok(Self::new(body))
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<String> {
        Ok(self.body.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
