use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AlertError;
use crate::ids::{AlertId, DeliveryId, PatientId, RuleId, UserId};

// ── Alert status ──────────────────────────────────────────────

/// Alert lifecycle state. Only moves forward: `new` → `acknowledged` → `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    #[serde(alias = "ack")]
    Acknowledged,
    Closed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Closed => "closed",
        }
    }

    /// Allowed: new→acknowledged, new→closed, acknowledged→closed.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::New, AlertStatus::Acknowledged)
                | (AlertStatus::New, AlertStatus::Closed)
                | (AlertStatus::Acknowledged, AlertStatus::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == AlertStatus::Closed
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(AlertStatus::New),
            "acknowledged" | "ack" => Ok(AlertStatus::Acknowledged),
            "closed" => Ok(AlertStatus::Closed),
            other => Err(AlertError::Validation(format!(
                "unknown alert status '{}' (expected new, acknowledged, or closed)",
                other
            ))),
        }
    }
}

// ── Alert instance ────────────────────────────────────────────

/// Snapshot captured when an alert fires. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    pub rule_name: String,
    pub rule_definition: serde_json::Value,
    pub metrics: serde_json::Value,
}

/// A single raised occurrence of a rule matching a patient's metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertInstance {
    pub id: AlertId,
    pub rule_id: RuleId,
    pub patient_id: PatientId,
    pub triggered_at: DateTime<Utc>,
    pub payload: AlertPayload,
    pub status: AlertStatus,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AlertInstance {
    pub fn new(
        rule_id: RuleId,
        patient_id: PatientId,
        payload: AlertPayload,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id,
            patient_id,
            triggered_at,
            payload,
            status: AlertStatus::New,
            acknowledged_by: None,
            acknowledged_at: None,
            updated_at: triggered_at,
        }
    }
}

/// Dashboard-style alert query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub patient_id: Option<PatientId>,
    pub rule_id: Option<RuleId>,
    /// Maximum number of alerts to return (default 100).
    pub limit: Option<u32>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &AlertInstance) -> bool {
        self.status.map_or(true, |s| alert.status == s)
            && self.patient_id.map_or(true, |p| alert.patient_id == p)
            && self.rule_id.map_or(true, |r| alert.rule_id == r)
    }

    pub fn limit_or_default(&self) -> usize {
        self.limit.unwrap_or(100) as usize
    }
}

// ── Delivery records ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(AlertError::Validation(format!(
                "unknown delivery status '{}'",
                other
            ))),
        }
    }
}

/// One notification-channel delivery attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub alert_id: AlertId,
    pub channel: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl DeliveryRecord {
    pub fn sent(alert_id: AlertId, channel: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            channel: channel.into(),
            status: DeliveryStatus::Sent,
            created_at: at,
            sent_at: Some(at),
            error_message: None,
        }
    }

    pub fn failed(
        alert_id: AlertId,
        channel: impl Into<String>,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            channel: channel.into(),
            status: DeliveryStatus::Failed,
            created_at: at,
            sent_at: None,
            error_message: Some(error.into()),
        }
    }
}
