// src/feed/types.rs
use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// One parsed feed entry. Immutable once parsed.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    /// Sanitized category terms; empty when the entry carries none.
    pub category_tags: BTreeSet<String>,
}

/// Anything that can hand back the raw feed document.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
    fn name(&self) -> &str;
}
