// src/feed/mod.rs
pub mod client;
pub mod parser;
pub mod types;

pub use client::{HttpFeed, StaticFeed};
pub use parser::{parse_entries, parse_timestamp};
pub use types::{FeedEntry, FeedSource};
