//! Notifier trait definition and shared error types.

use std::collections::HashMap;

use crate::templating::TemplateContext;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel rejected delivery: {0}")]
    Rejected(String),

    #[error("Channel did not answer within {0}ms")]
    Timeout(u64),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Flat metadata (alert id, rule id, patient id).
    pub metadata: HashMap<String, String>,
    /// Structured context for channels that render their own body.
    #[serde(skip)]
    pub context: Option<TemplateContext>,
}

impl Notification {
    pub fn alert_id(&self) -> &str {
        self.metadata.get("alert_id").map(String::as_str).unwrap_or("")
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Channel name recorded on delivery records (e.g. "in_app", "webhook").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
