//! Row types and their mapping onto domain types.

use carewatch_core::{
    json, AlertInstance, AlertPayload, AlertStatus, DeliveryRecord, DeliveryStatus, MetricsRecord,
    PatientMetrics,
};
use carewatch_rules::schema::{AlertRule, Condition, RuleScope};
use carewatch_rules::store::{ActiveRules, UnreadableRule};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tracing::warn;

use crate::error::StorageError;

// ── alert_rules ─────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RuleRow {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub scope: String,
    pub patient_id: Option<Uuid>,
    pub name: String,
    pub is_active: bool,
    /// JSONB read back as text.
    pub definition_json: String,
    pub dedup_window_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for AlertRule {
    type Error = StorageError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let scope: RuleScope = row
            .scope
            .parse()
            .map_err(|e| StorageError::corrupt("alert_rules", e))?;
        let condition: Condition = json::from_str(&row.definition_json).map_err(|e| {
            StorageError::corrupt("alert_rules", format!("rule {}: {}", row.id, e))
        })?;
        let dedup_window_minutes = u32::try_from(row.dedup_window_minutes).map_err(|_| {
            StorageError::corrupt(
                "alert_rules",
                format!("rule {} has negative dedup window", row.id),
            )
        })?;
        Ok(AlertRule {
            id: row.id,
            owner_user_id: row.owner_user_id,
            scope,
            patient_id: row.patient_id,
            name: row.name,
            active: row.is_active,
            condition,
            dedup_window_minutes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Split active rule rows into readable rules and the ones that did not
/// convert, so one bad definition does not hide every other rule.
pub(crate) fn partition_rules(rows: Vec<RuleRow>) -> ActiveRules {
    let mut active = ActiveRules::default();
    for row in rows {
        let id = row.id;
        match AlertRule::try_from(row) {
            Ok(rule) => active.rules.push(rule),
            Err(e) => {
                warn!(rule_id = %id, error = %e, "stored rule does not parse");
                active.unreadable.push(UnreadableRule {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
    active
}

// ── alert_instances ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AlertRow {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub patient_id: Uuid,
    pub triggered_at: DateTime<Utc>,
    /// JSONB read back as text.
    pub payload_json: String,
    pub status: String,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertInstance {
    type Error = StorageError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let status: AlertStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::corrupt("alert_instances", e))?;
        let payload: AlertPayload = json::from_str(&row.payload_json).map_err(|e| {
            StorageError::corrupt("alert_instances", format!("alert {}: {}", row.id, e))
        })?;
        Ok(AlertInstance {
            id: row.id,
            rule_id: row.rule_id,
            patient_id: row.patient_id,
            triggered_at: row.triggered_at,
            payload,
            status,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: row.acknowledged_at,
            updated_at: row.updated_at,
        })
    }
}

// ── alert_delivery ──────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeliveryRow {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub channel: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = StorageError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status: DeliveryStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::corrupt("alert_delivery", e))?;
        Ok(DeliveryRecord {
            id: row.id,
            alert_id: row.alert_id,
            channel: row.channel,
            status,
            created_at: row.created_at,
            sent_at: row.sent_at,
            error_message: row.error_message,
        })
    }
}

// ── patient_metrics ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MetricsRow {
    pub patient_id: Uuid,
    pub days_without_medication: Option<i32>,
    pub mood_latest: Option<f64>,
    pub sleep_hours_avg_7d: Option<f64>,
    pub checkin_missing_3d: Option<bool>,
    pub phq9_score: Option<i32>,
    pub gad7_score: Option<i32>,
    pub suicide_risk_score: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl From<MetricsRow> for MetricsRecord {
    fn from(row: MetricsRow) -> Self {
        let computed_at = row.computed_at;
        let mut record: MetricsRecord = PatientMetrics {
            patient_id: row.patient_id,
            days_without_medication: row.days_without_medication.map(i64::from),
            mood_latest: row.mood_latest,
            sleep_hours_avg_7d: row.sleep_hours_avg_7d,
            checkin_missing_3d: row.checkin_missing_3d,
            phq9_score: row.phq9_score.map(i64::from),
            gad7_score: row.gad7_score.map(i64::from),
            suicide_risk_score: row.suicide_risk_score,
        }
        .into();
        record.computed_at = Some(computed_at);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carewatch_core::{fields, AlertError, FieldValue};

    fn rule_row() -> RuleRow {
        RuleRow {
            id: Uuid::new_v4(),
            owner_user_id: Uuid::new_v4(),
            scope: "owner_fleet".into(),
            patient_id: None,
            name: "Missed medication".into(),
            is_active: true,
            definition_json: r#"{"field": "days_without_medication", "op": ">=", "value": 3}"#
                .into(),
            dedup_window_minutes: 60,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rule_row_maps_to_rule() {
        let rule = AlertRule::try_from(rule_row()).unwrap();
        assert_eq!(rule.scope, RuleScope::OwnerFleet);
        assert_eq!(rule.dedup_window_minutes, 60);
        assert!(rule.active);
        assert!(matches!(rule.condition, Condition::Predicate(_)));
    }

    #[test]
    fn unparseable_definition_is_corrupt() {
        let mut row = rule_row();
        row.definition_json = r#"{"field": "x", "op": "~="}"#.into();
        let err = AlertRule::try_from(row).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { table: "alert_rules", .. }));

        let mut row = rule_row();
        row.dedup_window_minutes = -5;
        assert!(AlertRule::try_from(row).is_err());
    }

    #[test]
    fn deep_definition_reads_back() {
        let mut definition = r#"{"field": "phq9_score", "op": ">=", "value": 20}"#.to_string();
        for _ in 0..300 {
            definition = format!(r#"{{"operator": "and", "conditions": [{definition}]}}"#);
        }
        let mut row = rule_row();
        row.definition_json = definition;
        let rule = AlertRule::try_from(row).unwrap();
        assert_eq!(rule.condition.depth(), 301);
    }

    #[test]
    fn bad_rule_rows_are_set_aside() {
        let mut bad = rule_row();
        bad.definition_json = r#"{"field": "phq9_score", "op": "contains", "value": 1}"#.into();
        let bad_id = bad.id;
        let rows = vec![rule_row(), bad, rule_row()];

        let active = partition_rules(rows);
        assert_eq!(active.rules.len(), 2);
        assert_eq!(active.unreadable.len(), 1);
        assert_eq!(active.unreadable[0].id, bad_id);
        assert!(active.unreadable[0].reason.contains("alert_rules"));
    }

    #[test]
    fn alert_row_with_unknown_status_is_corrupt() {
        let row = AlertRow {
            id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            triggered_at: Utc::now(),
            payload_json: r#"{"rule_name": "r", "rule_definition": {}, "metrics": {}}"#.into(),
            status: "snoozed".into(),
            acknowledged_by: None,
            acknowledged_at: None,
            updated_at: Utc::now(),
        };
        assert!(AlertInstance::try_from(row).is_err());
    }

    #[test]
    fn metrics_row_keeps_nulls_as_missing() {
        let row = MetricsRow {
            patient_id: Uuid::new_v4(),
            days_without_medication: Some(4),
            mood_latest: None,
            sleep_hours_avg_7d: Some(6.5),
            checkin_missing_3d: Some(true),
            phq9_score: None,
            gad7_score: Some(12),
            suicide_risk_score: None,
            computed_at: Utc::now(),
        };
        let record = MetricsRecord::from(row);
        assert_eq!(
            record.get(fields::DAYS_WITHOUT_MEDICATION),
            Some(&FieldValue::Integer(4))
        );
        assert!(record.get(fields::MOOD_LATEST).is_none());
        assert!(record.computed_at.is_some());
    }

    #[test]
    fn storage_errors_surface_as_transient_store_errors() {
        let err: AlertError = StorageError::corrupt("alert_rules", "bad").into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("alert_rules"));
    }
}
