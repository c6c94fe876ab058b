//! Best-effort notification delivery for a freshly created alert.

use std::collections::HashMap;
use std::time::Duration;

use carewatch_core::{AlertInstance, DeliveryRecord};
use carewatch_notify::{AlertContext, Dispatcher, Notification, RuleContext, TemplateContext};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::schema::AlertRule;
use crate::store::AlertRepository;

use super::core::with_timeout;

pub(super) fn build_notification(rule: &AlertRule, alert: &AlertInstance) -> Notification {
    let triggered_at = alert.triggered_at.to_rfc3339();
    let context = TemplateContext {
        rule: RuleContext {
            id: rule.id.to_string(),
            name: rule.name.clone(),
            scope: rule.scope.as_str().to_string(),
        },
        alert: AlertContext {
            id: alert.id.to_string(),
            patient_id: alert.patient_id.to_string(),
            triggered_at: triggered_at.clone(),
            metrics: alert.payload.metrics.clone(),
        },
        event: "trigger".to_string(),
        now: Utc::now().to_rfc3339(),
    };

    Notification {
        subject: format!("[carewatch] {}", rule.name),
        body: format!(
            "Rule '{}' matched for patient {} at {}",
            rule.name, alert.patient_id, triggered_at
        ),
        metadata: HashMap::from([
            ("alert_id".to_string(), alert.id.to_string()),
            ("rule_id".to_string(), rule.id.to_string()),
            ("patient_id".to_string(), alert.patient_id.to_string()),
            ("event".to_string(), "trigger".to_string()),
        ]),
        context: Some(context),
    }
}

/// Dispatch to every channel and record one delivery per attempt.
///
/// Failures are logged and swallowed; the alert stands regardless.
/// Returns the number of delivery records written.
pub(super) async fn deliver(
    dispatcher: &Dispatcher,
    alerts: &dyn AlertRepository,
    rule: &AlertRule,
    alert: &AlertInstance,
    now: DateTime<Utc>,
    timeout: Duration,
) -> usize {
    let notification = build_notification(rule, alert);
    let results = dispatcher.dispatch(&notification).await;

    let mut written = 0;
    for result in results {
        let record = match result.error {
            None if result.success => DeliveryRecord::sent(alert.id, result.channel, now),
            error => DeliveryRecord::failed(
                alert.id,
                result.channel,
                error.unwrap_or_else(|| "delivery failed".to_string()),
                now,
            ),
        };
        match with_timeout("insert_delivery", timeout, alerts.insert_delivery(&record)).await {
            Ok(()) => written += 1,
            Err(e) => warn!(
                alert_id = %alert.id,
                channel = %record.channel,
                error = %e,
                "failed to record delivery"
            ),
        }
    }
    written
}
