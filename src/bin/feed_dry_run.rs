//! Fetch the feed once (or read `FEED_FILE`) and print what the relay would
//! deliver, oldest first. Sends nothing.

use std::path::PathBuf;

use feed_relay_bot::config::Settings;
use feed_relay_bot::feed::{parse_entries, FeedSource, HttpFeed, StaticFeed};
use feed_relay_bot::filter::CategoryFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let settings = Settings::from_env()?;
    let source: Box<dyn FeedSource> = match std::env::var("FEED_FILE") {
        Ok(path) => Box::new(StaticFeed::from_path(&PathBuf::from(path))?),
        Err(_) => Box::new(HttpFeed::new(&settings.feed_url, settings.http_timeout)?),
    };

    let raw = source.fetch().await?;
    let entries = parse_entries(&raw);
    let filter = CategoryFilter::new(&settings.categories);

    println!("{} entries from {}", entries.len(), source.name());
    for entry in entries.iter().rev() {
        let mark = if filter.matches(&entry.category_tags) { "SEND" } else { "skip" };
        println!(
            "[{mark}] {} {} {:?}\n       {}",
            entry.published_at.to_rfc3339(),
            entry.title,
            entry.category_tags,
            entry.link
        );
    }
    if entries.iter().all(|e| !filter.matches(&e.category_tags)) {
        if let Some(newest) = entries.first() {
            println!("no match; a cold start would send the newest entry: {}", newest.link);
        }
    }
    Ok(())
}
