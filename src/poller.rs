// src/poller.rs
//! The polling loop: fetch → parse → filter → deliver, oldest entry first,
//! deduplicated by the publish timestamp of the last delivered entry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::feed::{parse_entries, FeedEntry, FeedSource, HttpFeed};
use crate::filter::CategoryFilter;
use crate::notify::{Notifier, TelegramNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    #[default]
    Idle,
    Fetching,
    Filtering,
    Sending,
    Sleeping,
    ErrorBackoff,
}

/// State shared between the loop task (sole writer) and diagnostics (readers).
#[derive(Debug, Default)]
pub struct PollerStatus {
    running: AtomicBool,
    watermark: RwLock<Option<DateTime<Utc>>>,
    phase: RwLock<PollPhase>,
    cycles_completed: AtomicU64,
    cycles_aborted: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub phase: PollPhase,
    pub watermark: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
}

impl PollerStatus {
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the watermark forward to `ts`. Never moves it back.
    pub(crate) fn advance_watermark(&self, ts: DateTime<Utc>) -> bool {
        let mut mark = self.watermark.write().unwrap_or_else(PoisonError::into_inner);
        match *mark {
            Some(current) if ts <= current => false,
            _ => {
                *mark = Some(ts);
                gauge!("relay_watermark_ts").set(ts.timestamp() as f64);
                true
            }
        }
    }

    pub fn phase(&self) -> PollPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: PollPhase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_running(),
            phase: self.phase(),
            watermark: self.watermark(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Chat the notifier delivers to.
    pub destination: String,
    pub poll_interval: Duration,
    /// Pause after every send attempt, successful or not.
    pub send_delay: Duration,
    pub error_backoff: Duration,
}

impl PollSettings {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            destination: s.chat_id.clone().unwrap_or_default(),
            poll_interval: s.poll_interval,
            send_delay: s.send_delay,
            error_backoff: s.error_backoff,
        }
    }
}

/// What one cycle did; returned for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetch_failed: bool,
    pub entries: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub fallback_used: bool,
}

#[derive(Clone)]
pub struct Poller {
    feed: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    filter: Arc<CategoryFilter>,
    settings: PollSettings,
    status: Arc<PollerStatus>,
}

impl Poller {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
        filter: CategoryFilter,
        settings: PollSettings,
    ) -> Self {
        Self {
            feed,
            notifier,
            filter: Arc::new(filter),
            settings,
            status: Arc::new(PollerStatus::default()),
        }
    }

    /// Wire the production feed and Telegram notifier from settings.
    pub fn from_settings(s: &Settings) -> Result<Self> {
        let feed = HttpFeed::new(&s.feed_url, s.http_timeout)?;
        let notifier = TelegramNotifier::new(&s.telegram_api_base, s.bot_token.clone())
            .with_timeout(s.http_timeout);
        Ok(Self::new(
            Arc::new(feed),
            Arc::new(notifier),
            CategoryFilter::new(&s.categories),
            PollSettings::from_settings(s),
        ))
    }

    pub fn status(&self) -> Arc<PollerStatus> {
        Arc::clone(&self.status)
    }

    /// Spawn the loop as a background task unless one is already running.
    /// Returns whether this call started it.
    pub fn start(&self) -> bool {
        if self
            .status
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        tokio::spawn(self.clone().run_forever());
        true
    }

    /// Run cycles until the process ends. Each cycle runs as its own task so
    /// a panic inside it only costs that cycle.
    pub async fn run_forever(self) {
        info!(feed = self.feed.name(), notifier = self.notifier.name(), "poller started");
        loop {
            let poller = self.clone();
            let pause = match tokio::spawn(async move { poller.run_cycle().await }).await {
                Ok(report) => {
                    self.status.cycles_completed.fetch_add(1, Ordering::Relaxed);
                    counter!("relay_cycles_total").increment(1);
                    info!(
                        ?report,
                        wait_secs = self.settings.poll_interval.as_secs(),
                        "cycle finished; waiting before next check"
                    );
                    self.status.set_phase(PollPhase::Sleeping);
                    self.settings.poll_interval
                }
                Err(e) => {
                    self.status.cycles_aborted.fetch_add(1, Ordering::Relaxed);
                    counter!("relay_cycles_aborted_total").increment(1);
                    error!(
                        error = %e,
                        retry_secs = self.settings.error_backoff.as_secs(),
                        "polling cycle aborted"
                    );
                    self.status.set_phase(PollPhase::ErrorBackoff);
                    self.settings.error_backoff
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// One fetch/filter/deliver pass. Delivery and fetch failures are logged
    /// and reported, never returned.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        info!("fetching news");
        self.status.set_phase(PollPhase::Fetching);

        let raw = match self.feed.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = ?e, feed = self.feed.name(), "feed fetch failed");
                report.fetch_failed = true;
                return report;
            }
        };

        let entries = parse_entries(&raw);
        report.entries = entries.len();
        if entries.is_empty() {
            warn!("failed to fetch the feed or no entries found");
            return report;
        }
        info!(count = entries.len(), "found entries in the feed");
        self.status.set_phase(PollPhase::Filtering);

        let mut found_interesting = false;
        // Feeds list newest first; deliver oldest first.
        for entry in entries.iter().rev() {
            if let Some(mark) = self.status.watermark() {
                if entry.published_at <= mark {
                    continue;
                }
            }
            debug!(categories = ?entry.category_tags, link = %entry.link, "entry categories");
            if !self.filter.matches(&entry.category_tags) {
                continue;
            }
            found_interesting = true;
            info!(title = %entry.title, "sending message for article");
            self.deliver(entry, &mut report).await;
            self.status.set_phase(PollPhase::Filtering);
        }

        if !found_interesting && self.status.watermark().is_none() {
            if let Some(newest) = entries.first() {
                info!(title = %newest.title, "no interesting articles found; sending fallback article");
                report.fallback_used = true;
                self.deliver(newest, &mut report).await;
            }
        }

        report
    }

    async fn deliver(&self, entry: &FeedEntry, report: &mut CycleReport) {
        self.status.set_phase(PollPhase::Sending);
        report.attempted += 1;
        match self
            .notifier
            .send(&self.settings.destination, &entry.link)
            .await
        {
            Ok(ack) if ack.ok => {
                self.status.advance_watermark(entry.published_at);
                report.delivered += 1;
                counter!("relay_deliveries_total", "outcome" => "delivered").increment(1);
                info!(link = %entry.link, published_at = %entry.published_at, "sent feed link");
            }
            Ok(ack) => {
                report.failed += 1;
                counter!("relay_deliveries_total", "outcome" => "rejected").increment(1);
                error!(link = %entry.link, response = %ack.detail, "failed to send message");
            }
            Err(e) => {
                report.failed += 1;
                counter!("relay_deliveries_total", "outcome" => "error").increment(1);
                error!(link = %entry.link, error = ?e, "error sending message");
            }
        }
        tokio::time::sleep(self.settings.send_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn watermark_starts_unset_and_never_regresses() {
        let st = PollerStatus::default();
        assert_eq!(st.watermark(), None);

        let t1 = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
        assert!(st.advance_watermark(t2));
        assert!(!st.advance_watermark(t1));
        assert!(!st.advance_watermark(t2));
        assert_eq!(st.watermark(), Some(t2));
    }

    #[test]
    fn snapshot_reflects_state() {
        let st = PollerStatus::default();
        st.set_phase(PollPhase::Sending);
        let snap = st.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.phase, PollPhase::Sending);
        assert_eq!(snap.cycles_completed, 0);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["phase"], "sending");
        assert!(json["watermark"].is_null());
    }
}
