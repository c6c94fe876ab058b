//! [`PgStore`]: the repository traits over PostgreSQL.

use async_trait::async_trait;
use carewatch_core::{
    AlertFilter, AlertId, AlertInstance, AlertStatus, DeliveryRecord, MetricsRecord, PatientId,
    Result, RuleId, UserId,
};
use carewatch_rules::schema::AlertRule;
use carewatch_rules::store::{
    ActiveRules, AlertRepository, InsertOutcome, MetricsProvider, PatientDirectory, RuleRepository,
    StatusUpdate,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::error::StorageError;
use crate::rows::{partition_rules, AlertRow, DeliveryRow, MetricsRow, RuleRow};

/// PostgreSQL-backed store. Cheap to clone; shares the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Rules ───────────────────────────────────────────────────────────

impl PgStore {
    /// JSONB columns are selected as text and parsed here, so deep condition
    /// trees are not cut off by the driver's JSON decoder.
    async fn fetch_rules(&self, owner: Option<UserId>) -> std::result::Result<Vec<RuleRow>, StorageError> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query_as::<_, RuleRow>(
                    "SELECT id, owner_user_id, scope, patient_id, name, is_active,
                            definition_json::text AS definition_json, dedup_window_minutes, created_at, updated_at
                     FROM alert_rules
                     WHERE owner_user_id = $1
                     ORDER BY created_at DESC",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RuleRow>(
                    "SELECT id, owner_user_id, scope, patient_id, name, is_active,
                            definition_json::text AS definition_json, dedup_window_minutes, created_at, updated_at
                     FROM alert_rules
                     WHERE is_active
                     ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}

#[async_trait]
impl RuleRepository for PgStore {
    async fn list_active_rules(&self) -> Result<ActiveRules> {
        Ok(partition_rules(self.fetch_rules(None).await?))
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>> {
        let row = sqlx::query_as::<_, RuleRow>(
            "SELECT id, owner_user_id, scope, patient_id, name, is_active,
                    definition_json::text AS definition_json, dedup_window_minutes, created_at, updated_at
             FROM alert_rules
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(AlertRule::try_from).transpose()?)
    }

    async fn list_rules_by_owner(&self, owner: UserId) -> Result<Vec<AlertRule>> {
        let rows = self.fetch_rules(Some(owner)).await?;
        Ok(rows
            .into_iter()
            .map(AlertRule::try_from)
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn upsert_rule(&self, rule: &AlertRule) -> Result<()> {
        let definition = rule.definition_json()?;
        sqlx::query(
            "INSERT INTO alert_rules (id, owner_user_id, scope, patient_id, name, is_active,
                                      definition_json, dedup_window_minutes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                scope = EXCLUDED.scope,
                patient_id = EXCLUDED.patient_id,
                name = EXCLUDED.name,
                is_active = EXCLUDED.is_active,
                definition_json = EXCLUDED.definition_json,
                dedup_window_minutes = EXCLUDED.dedup_window_minutes,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(rule.id)
        .bind(rule.owner_user_id)
        .bind(rule.scope.as_str())
        .bind(rule.patient_id)
        .bind(&rule.name)
        .bind(rule.active)
        .bind(&definition)
        .bind(window_param(rule.dedup_window_minutes))
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn set_rule_active(&self, id: RuleId, active: bool, at: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE alert_rules SET is_active = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(active)
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Metrics and patient links ───────────────────────────────────────

#[async_trait]
impl MetricsProvider for PgStore {
    async fn latest_metrics(&self, patient: PatientId) -> Result<Option<MetricsRecord>> {
        let row = sqlx::query_as::<_, MetricsRow>(
            "SELECT patient_id, days_without_medication, mood_latest, sleep_hours_avg_7d,
                    checkin_missing_3d, phq9_score, gad7_score, suicide_risk_score, computed_at
             FROM patient_metrics
             WHERE patient_id = $1",
        )
        .bind(patient)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(MetricsRecord::from))
    }
}

#[async_trait]
impl PatientDirectory for PgStore {
    async fn active_patients(&self, owner: UserId) -> Result<Vec<PatientId>> {
        let patients = sqlx::query_scalar::<_, PatientId>(
            "SELECT patient_id FROM patient_professionals
             WHERE professional_id = $1 AND status = 'active'
             ORDER BY patient_id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(patients)
    }
}

// ── Alerts and deliveries ───────────────────────────────────────────

/// Windows are bounded by `u32` minutes; the column is `INTEGER`.
fn window_param(minutes: u32) -> i32 {
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

impl PgStore {
    /// Check-then-insert under a transaction-scoped advisory lock on the
    /// (rule, patient) pair, so concurrent engines serialize per pair.
    async fn insert_unless_recent(
        &self,
        alert: &AlertInstance,
        window_minutes: u32,
    ) -> std::result::Result<InsertOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}", alert.rule_id, alert.patient_id))
            .execute(&mut *tx)
            .await?;

        if window_minutes > 0 {
            let recent = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT max(triggered_at) FROM alert_instances
                 WHERE rule_id = $1 AND patient_id = $2
                   AND triggered_at <= $3
                   AND triggered_at >= $3 - make_interval(mins => $4)",
            )
            .bind(alert.rule_id)
            .bind(alert.patient_id)
            .bind(alert.triggered_at)
            .bind(window_param(window_minutes))
            .fetch_one(&mut *tx)
            .await?;

            if let Some(at) = recent {
                debug!(rule_id = %alert.rule_id, patient_id = %alert.patient_id, last = %at, "recent alert exists");
                tx.rollback().await?;
                return Ok(InsertOutcome::Duplicate);
            }
        }

        let payload = serde_json::to_value(&alert.payload)
            .map_err(|e| StorageError::corrupt("alert_instances", e))?;
        sqlx::query(
            "INSERT INTO alert_instances (id, rule_id, patient_id, triggered_at, payload_json,
                                          status, acknowledged_by, acknowledged_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(alert.id)
        .bind(alert.rule_id)
        .bind(alert.patient_id)
        .bind(alert.triggered_at)
        .bind(&payload)
        .bind(alert.status.as_str())
        .bind(alert.acknowledged_by)
        .bind(alert.acknowledged_at)
        .bind(alert.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InsertOutcome::Created)
    }
}

#[async_trait]
impl AlertRepository for PgStore {
    async fn latest_trigger(
        &self,
        rule: RuleId,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(triggered_at) FROM alert_instances
             WHERE rule_id = $1 AND patient_id = $2 AND triggered_at <= $3",
        )
        .bind(rule)
        .bind(patient)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(latest)
    }

    async fn insert_alert_unless_recent(
        &self,
        alert: &AlertInstance,
        window_minutes: u32,
    ) -> Result<InsertOutcome> {
        Ok(self.insert_unless_recent(alert, window_minutes).await?)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertInstance>> {
        let row = sqlx::query_as::<_, AlertRow>(
            "SELECT id, rule_id, patient_id, triggered_at, payload_json::text AS payload_json, status,
                    acknowledged_by, acknowledged_at, updated_at
             FROM alert_instances
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(AlertInstance::try_from).transpose()?)
    }

    async fn update_status(
        &self,
        id: AlertId,
        expected: AlertStatus,
        update: &StatusUpdate,
    ) -> Result<Option<AlertInstance>> {
        let row = sqlx::query_as::<_, AlertRow>(
            "UPDATE alert_instances SET
                status = $3,
                acknowledged_by = $4,
                acknowledged_at = $5,
                updated_at = $6
             WHERE id = $1 AND status = $2
             RETURNING id, rule_id, patient_id, triggered_at, payload_json::text AS payload_json, status,
                       acknowledged_by, acknowledged_at, updated_at",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.acknowledged_by)
        .bind(update.acknowledged_at)
        .bind(update.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(AlertInstance::try_from).transpose()?)
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertInstance>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT id, rule_id, patient_id, triggered_at, payload_json::text AS payload_json, status,
                    acknowledged_by, acknowledged_at, updated_at
             FROM alert_instances
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR patient_id = $2)
               AND ($3::uuid IS NULL OR rule_id = $3)
             ORDER BY triggered_at DESC
             LIMIT $4",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.patient_id)
        .bind(filter.rule_id)
        .bind(filter.limit_or_default() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(AlertInstance::try_from)
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_delivery (id, alert_id, channel, status, created_at, sent_at, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.alert_id)
        .bind(&record.channel)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.sent_at)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn list_deliveries(&self, alert: AlertId) -> Result<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            "SELECT id, alert_id, channel, status, created_at, sent_at, error_message
             FROM alert_delivery
             WHERE alert_id = $1
             ORDER BY created_at, id",
        )
        .bind(alert)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(DeliveryRecord::try_from)
            .collect::<std::result::Result<_, _>>()?)
    }
}
