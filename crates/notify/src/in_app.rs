//! In-app channel.
//!
//! The dashboard reads alerts straight from the alert store, so delivering
//! in-app means nothing more than acknowledging the hand-off. The resulting
//! `sent` delivery record is what the dashboard's delivery view shows.

use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug, Default, Clone)]
pub struct InAppNotifier;

impl InAppNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for InAppNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(
            alert_id = notification.alert_id(),
            subject = %notification.subject,
            "in-app notification recorded"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "in_app"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_app_always_succeeds() {
        let notifier = InAppNotifier::new();
        assert_eq!(notifier.channel_name(), "in_app");
        let notification = Notification {
            subject: "[carewatch] Low mood".to_string(),
            body: "Rule 'Low mood' matched".to_string(),
            metadata: std::collections::HashMap::from([(
                "alert_id".to_string(),
                "a-1".to_string(),
            )]),
            context: None,
        };
        assert!(notifier.send(&notification).await.is_ok());
    }
}
