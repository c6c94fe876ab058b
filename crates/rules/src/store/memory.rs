//! In-memory store implementing every repository trait.
//!
//! Backs the server when PostgreSQL is not configured, and all engine tests.
//! Uses `std::sync::RwLock`; no lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use carewatch_core::{
    AlertFilter, AlertId, AlertInstance, AlertStatus, DeliveryRecord, MetricsRecord, PatientId,
    Result, RuleId, UserId,
};
use chrono::{DateTime, Duration, Utc};

use super::{
    ActiveRules, AlertRepository, InsertOutcome, LinkStatus, MetricsProvider, PatientDirectory,
    RuleRepository, StatusUpdate,
};
use crate::schema::AlertRule;

#[derive(Debug, Clone)]
struct PatientLink {
    owner: UserId,
    patient: PatientId,
    status: LinkStatus,
}

#[derive(Default)]
pub struct InMemoryStore {
    rules: RwLock<HashMap<RuleId, AlertRule>>,
    metrics: RwLock<HashMap<PatientId, MetricsRecord>>,
    links: RwLock<Vec<PatientLink>>,
    /// Insertion order, which is also trigger order for a live engine.
    alerts: RwLock<Vec<AlertInstance>>,
    deliveries: RwLock<Vec<DeliveryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ─────────────────────────────────────────────────────

    pub fn insert_rule(&self, rule: AlertRule) {
        self.rules
            .write()
            .expect("rules lock poisoned")
            .insert(rule.id, rule);
    }

    /// Replace a patient's snapshot (the external pipeline's job in production).
    pub fn put_metrics(&self, record: MetricsRecord) {
        self.metrics
            .write()
            .expect("metrics lock poisoned")
            .insert(record.patient_id, record);
    }

    /// Link or re-link a patient to an owner.
    pub fn link_patient(&self, owner: UserId, patient: PatientId, status: LinkStatus) {
        let mut links = self.links.write().expect("links lock poisoned");
        match links
            .iter_mut()
            .find(|l| l.owner == owner && l.patient == patient)
        {
            Some(link) => link.status = status,
            None => links.push(PatientLink {
                owner,
                patient,
                status,
            }),
        }
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().expect("alerts lock poisoned").len()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.read().expect("deliveries lock poisoned").len()
    }
}

/// Whether `triggered_at` falls in `[now - window, now]`.
pub(crate) fn within_window(triggered_at: DateTime<Utc>, now: DateTime<Utc>, window_minutes: u32) -> bool {
    window_minutes > 0
        && triggered_at <= now
        && now - triggered_at <= Duration::minutes(i64::from(window_minutes))
}

#[async_trait]
impl RuleRepository for InMemoryStore {
    async fn list_active_rules(&self) -> Result<ActiveRules> {
        let rules = self.rules.read().expect("rules lock poisoned");
        let mut active: Vec<AlertRule> = rules.values().filter(|r| r.active).cloned().collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active.into())
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>> {
        Ok(self.rules.read().expect("rules lock poisoned").get(&id).cloned())
    }

    async fn list_rules_by_owner(&self, owner: UserId) -> Result<Vec<AlertRule>> {
        let rules = self.rules.read().expect("rules lock poisoned");
        let mut owned: Vec<AlertRule> = rules
            .values()
            .filter(|r| r.owner_user_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn upsert_rule(&self, rule: &AlertRule) -> Result<()> {
        self.insert_rule(rule.clone());
        Ok(())
    }

    async fn set_rule_active(&self, id: RuleId, active: bool, at: DateTime<Utc>) -> Result<bool> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        Ok(match rules.get_mut(&id) {
            Some(rule) => {
                rule.active = active;
                rule.updated_at = at;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl MetricsProvider for InMemoryStore {
    async fn latest_metrics(&self, patient: PatientId) -> Result<Option<MetricsRecord>> {
        Ok(self
            .metrics
            .read()
            .expect("metrics lock poisoned")
            .get(&patient)
            .cloned())
    }
}

#[async_trait]
impl PatientDirectory for InMemoryStore {
    async fn active_patients(&self, owner: UserId) -> Result<Vec<PatientId>> {
        Ok(self
            .links
            .read()
            .expect("links lock poisoned")
            .iter()
            .filter(|l| l.owner == owner && l.status == LinkStatus::Active)
            .map(|l| l.patient)
            .collect())
    }
}

#[async_trait]
impl AlertRepository for InMemoryStore {
    async fn latest_trigger(
        &self,
        rule: RuleId,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .alerts
            .read()
            .expect("alerts lock poisoned")
            .iter()
            .filter(|a| a.rule_id == rule && a.patient_id == patient && a.triggered_at <= now)
            .map(|a| a.triggered_at)
            .max())
    }

    async fn insert_alert_unless_recent(
        &self,
        alert: &AlertInstance,
        window_minutes: u32,
    ) -> Result<InsertOutcome> {
        let mut alerts = self.alerts.write().expect("alerts lock poisoned");
        let recent = alerts.iter().any(|a| {
            a.rule_id == alert.rule_id
                && a.patient_id == alert.patient_id
                && within_window(a.triggered_at, alert.triggered_at, window_minutes)
        });
        if recent {
            return Ok(InsertOutcome::Duplicate);
        }
        alerts.push(alert.clone());
        Ok(InsertOutcome::Created)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertInstance>> {
        Ok(self
            .alerts
            .read()
            .expect("alerts lock poisoned")
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: AlertId,
        expected: AlertStatus,
        update: &StatusUpdate,
    ) -> Result<Option<AlertInstance>> {
        let mut alerts = self.alerts.write().expect("alerts lock poisoned");
        let Some(alert) = alerts.iter_mut().find(|a| a.id == id && a.status == expected) else {
            return Ok(None);
        };
        alert.status = update.status;
        alert.acknowledged_by = update.acknowledged_by;
        alert.acknowledged_at = update.acknowledged_at;
        alert.updated_at = update.updated_at;
        Ok(Some(alert.clone()))
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertInstance>> {
        let alerts = self.alerts.read().expect("alerts lock poisoned");
        let mut matched: Vec<AlertInstance> =
            alerts.iter().filter(|a| filter.matches(a)).cloned().collect();
        matched.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        matched.truncate(filter.limit_or_default());
        Ok(matched)
    }

    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()> {
        self.deliveries
            .write()
            .expect("deliveries lock poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn list_deliveries(&self, alert: AlertId) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .deliveries
            .read()
            .expect("deliveries lock poisoned")
            .iter()
            .filter(|d| d.alert_id == alert)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carewatch_core::AlertPayload;
    use uuid::Uuid;

    fn alert(rule: RuleId, patient: PatientId, at: DateTime<Utc>) -> AlertInstance {
        AlertInstance::new(
            rule,
            patient,
            AlertPayload {
                rule_name: "r".into(),
                rule_definition: serde_json::json!({}),
                metrics: serde_json::json!({}),
            },
            at,
        )
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc::now();
        assert!(within_window(now, now, 60));
        assert!(within_window(now - Duration::minutes(60), now, 60));
        assert!(!within_window(now - Duration::minutes(61), now, 60));
        assert!(!within_window(now + Duration::minutes(1), now, 60));
        assert!(!within_window(now, now, 0));
    }

    #[tokio::test]
    async fn insert_unless_recent_suppresses_inside_window() {
        let store = InMemoryStore::new();
        let (rule, patient) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();

        let first = alert(rule, patient, t0);
        assert_eq!(
            store.insert_alert_unless_recent(&first, 60).await.unwrap(),
            InsertOutcome::Created
        );
        let again = alert(rule, patient, t0 + Duration::minutes(30));
        assert_eq!(
            store.insert_alert_unless_recent(&again, 60).await.unwrap(),
            InsertOutcome::Duplicate
        );
        // A different patient is unaffected.
        let other = alert(rule, Uuid::new_v4(), t0 + Duration::minutes(30));
        assert_eq!(
            store.insert_alert_unless_recent(&other, 60).await.unwrap(),
            InsertOutcome::Created
        );
        // Zero window never suppresses.
        let unguarded = alert(rule, patient, t0 + Duration::minutes(30));
        assert_eq!(
            store.insert_alert_unless_recent(&unguarded, 0).await.unwrap(),
            InsertOutcome::Created
        );
        assert_eq!(store.alert_count(), 3);
    }

    #[tokio::test]
    async fn update_status_is_compare_and_set() {
        let store = InMemoryStore::new();
        let a = alert(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        store.insert_alert_unless_recent(&a, 0).await.unwrap();

        let update = StatusUpdate {
            status: AlertStatus::Closed,
            acknowledged_by: None,
            acknowledged_at: None,
            updated_at: Utc::now(),
        };
        assert!(store
            .update_status(a.id, AlertStatus::Acknowledged, &update)
            .await
            .unwrap()
            .is_none());
        let updated = store
            .update_status(a.id, AlertStatus::New, &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Closed);
    }

    #[tokio::test]
    async fn only_active_links_are_returned() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let (p1, p2, p3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.link_patient(owner, p1, LinkStatus::Active);
        store.link_patient(owner, p2, LinkStatus::Pending);
        store.link_patient(owner, p3, LinkStatus::Active);
        store.link_patient(owner, p3, LinkStatus::Inactive);
        store.link_patient(Uuid::new_v4(), p2, LinkStatus::Active);

        assert_eq!(store.active_patients(owner).await.unwrap(), vec![p1]);
    }

    #[tokio::test]
    async fn list_alerts_newest_first_with_limit() {
        let store = InMemoryStore::new();
        let rule = Uuid::new_v4();
        let t0 = Utc::now();
        for i in 0..5 {
            let a = alert(rule, Uuid::new_v4(), t0 + Duration::minutes(i));
            store.insert_alert_unless_recent(&a, 0).await.unwrap();
        }
        let listed = store
            .list_alerts(&AlertFilter {
                rule_id: Some(rule),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].triggered_at, t0 + Duration::minutes(4));
        assert_eq!(listed[1].triggered_at, t0 + Duration::minutes(3));
    }
}
