//! Alert status transitions: `new` → `acknowledged` → `closed`.
//!
//! The only writer of alert status. Updates are compare-and-set on the
//! status read just before, so two racing transitions cannot move an alert
//! backwards; the loser re-reads and is re-validated.

use std::sync::Arc;

use carewatch_core::{
    AlertError, AlertFilter, AlertId, AlertInstance, AlertStatus, DeliveryRecord, Result, UserId,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::store::{AlertRepository, StatusUpdate};

const MAX_CAS_ATTEMPTS: usize = 3;

pub struct AlertLifecycle {
    alerts: Arc<dyn AlertRepository>,
}

impl AlertLifecycle {
    pub fn new(alerts: Arc<dyn AlertRepository>) -> Self {
        Self { alerts }
    }

    pub async fn transition(
        &self,
        alert_id: AlertId,
        status: &str,
        actor: Option<UserId>,
    ) -> Result<AlertInstance> {
        self.transition_at(alert_id, status, actor, Utc::now()).await
    }

    /// Move an alert to `status`.
    ///
    /// Checks run in order: actor present (`Unauthorized`), status parses
    /// (`Validation`), alert exists (`NotFound`), transition allowed
    /// (`InvalidTransition`, including a move to the current state).
    /// Leaving `new` records who acted and when, whichever state comes next.
    pub async fn transition_at(
        &self,
        alert_id: AlertId,
        status: &str,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<AlertInstance> {
        let actor = actor.ok_or_else(|| {
            AlertError::Unauthorized("changing alert status requires an actor identity".into())
        })?;
        let next: AlertStatus = status.parse()?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .alerts
                .get_alert(alert_id)
                .await?
                .ok_or_else(|| AlertError::not_found("alert", alert_id))?;

            if !current.status.can_transition_to(next) {
                return Err(AlertError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }

            let leaving_new = current.status == AlertStatus::New;
            let update = StatusUpdate {
                status: next,
                acknowledged_by: if leaving_new {
                    Some(actor)
                } else {
                    current.acknowledged_by
                },
                acknowledged_at: if leaving_new {
                    Some(now)
                } else {
                    current.acknowledged_at
                },
                updated_at: now,
            };

            if let Some(updated) = self
                .alerts
                .update_status(alert_id, current.status, &update)
                .await?
            {
                info!(
                    alert_id = %alert_id,
                    from = %current.status,
                    to = %next,
                    actor = %actor,
                    "alert status changed"
                );
                return Ok(updated);
            }
            debug!(alert_id = %alert_id, attempt, "alert status moved underneath us, retrying");
        }

        Err(AlertError::Store(format!(
            "alert {} kept changing status; gave up after {} attempts",
            alert_id, MAX_CAS_ATTEMPTS
        )))
    }

    pub async fn get(&self, alert_id: AlertId) -> Result<AlertInstance> {
        self.alerts
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AlertError::not_found("alert", alert_id))
    }

    /// Newest first.
    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertInstance>> {
        self.alerts.list_alerts(filter).await
    }

    /// Delivery attempts for an alert, oldest first.
    pub async fn deliveries(&self, alert_id: AlertId) -> Result<Vec<DeliveryRecord>> {
        self.get(alert_id).await?;
        self.alerts.list_deliveries(alert_id).await
    }
}
