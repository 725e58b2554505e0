// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Serialize;

use super::{Acknowledgment, Notifier};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` client.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: Option<String>,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token,
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            token
        )
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<Acknowledgment> {
        let Some(token) = self.token.as_deref() else {
            return Err(anyhow!("BOT_TOKEN not set; cannot deliver"));
        };

        // The endpoint embeds the token; strip URLs from transport errors.
        let rsp = self
            .client
            .post(self.endpoint(token))
            .timeout(self.timeout)
            .json(&SendMessage {
                chat_id: destination,
                text,
            })
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram post")?;

        // Telegram answers refusals with a 4xx *and* a JSON body carrying
        // `ok: false`, so the body decides, not the status.
        let status = rsp.status();
        let detail: serde_json::Value = rsp
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("telegram response body (status {status})"))?;

        let ok = detail
            .get("ok")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(Acknowledgment { ok, detail })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
