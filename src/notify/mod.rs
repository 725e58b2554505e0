// src/notify/mod.rs
pub mod telegram;

use anyhow::Result;

pub use telegram::TelegramNotifier;

/// Outcome of one send attempt that reached the API.
/// `ok == false` is the API refusing the message; transport failures are `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgment {
    pub ok: bool,
    /// Response body as returned by the API, for logging only.
    pub detail: serde_json::Value,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<Acknowledgment>;
    fn name(&self) -> &'static str;
}
