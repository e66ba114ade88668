pub mod discord;
pub mod message;

pub use discord::DiscordWebhook;
pub use message::{batch_payload, simple_payload, upcoming_lines};

use crate::models::BatchResult;
use crate::schedule::TradingCalendar;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const COLOR_SUCCESS: u32 = 0x00FF00;
pub const COLOR_MIXED: u32 = 0xFFA500;
pub const COLOR_FAILURE: u32 = 0xFF0000;
pub const COLOR_INFO: u32 = 0x0099FF;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

/// Outbound chat channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_message(&self, payload: &WebhookPayload) -> Result<()>;
}

/// Formats batch summaries and service messages and hands them to a sink
///
/// Delivery failures are logged and swallowed; callers never see them.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    calendar: TradingCalendar,
    username: String,
    display_limit: usize,
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        calendar: TradingCalendar,
        username: impl Into<String>,
        display_limit: usize,
    ) -> Self {
        Self {
            sink,
            calendar,
            username: username.into(),
            display_limit: display_limit.max(1),
        }
    }

    pub async fn notify_batch(&self, result: &BatchResult) -> bool {
        let payload = batch_payload(result, &self.calendar, &self.username, self.display_limit);
        self.deliver(&payload, "batch summary").await
    }

    pub async fn notify_simple(&self, message: &str, is_error: bool) -> bool {
        let now = chrono::Utc::now().with_timezone(&self.calendar.timezone());
        let payload = simple_payload(message, is_error, &self.username, now);
        self.deliver(&payload, "notification").await
    }

    async fn deliver(&self, payload: &WebhookPayload, what: &str) -> bool {
        match self.sink.send_message(payload).await {
            Ok(()) => {
                tracing::info!("✅ Discord {} sent", what);
                true
            }
            Err(e) => {
                tracing::error!("Failed to send Discord {}: {}", what, e);
                false
            }
        }
    }
}
