// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the relay series.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("relay_cycles_total", "Polling cycles that ran to completion.");
        describe_counter!(
            "relay_cycles_aborted_total",
            "Polling cycles aborted by an unexpected fault."
        );
        describe_counter!("relay_feed_errors_total", "Feed fetch failures.");
        describe_counter!("relay_entries_parsed_total", "Feed entries parsed.");
        describe_counter!(
            "relay_entries_skipped_total",
            "Feed entries skipped for a missing date or link."
        );
        describe_counter!(
            "relay_deliveries_total",
            "Send attempts by outcome (delivered, rejected, error)."
        );
        describe_histogram!("relay_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "relay_watermark_ts",
            "Unix ts of the last successfully delivered entry."
        );

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
