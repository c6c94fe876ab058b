//! Fans a notification out to every configured channel.
//!
//! Individual channel failures don't block other channels; each attempt
//! produces its own [`DispatchResult`]. A channel that does not answer
//! within the send timeout counts as failed.

use std::time::{Duration, Instant};

use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

/// Per-channel send timeout unless overridden with
/// [`Dispatcher::with_send_timeout`].
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            channels,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Create a dispatcher with no channels.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn add_channel(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver a notification to all channels, in order.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let alert_id = notification.alert_id();

        if self.channels.is_empty() {
            tracing::debug!(alert_id, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = Instant::now();
            let result =
                match tokio::time::timeout(self.send_timeout, channel.send(notification)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotifyError::Timeout(self.send_timeout.as_millis() as u64)),
                };
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        alert_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        alert_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}
