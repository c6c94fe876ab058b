//! Repository interfaces the engine reads from and writes to.
//!
//! The engine never talks to a database directly. It consumes four narrow
//! traits, implemented by [`memory::InMemoryStore`] here and by the
//! PostgreSQL store in `carewatch-storage`.

pub mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use carewatch_core::{
    AlertError, AlertFilter, AlertId, AlertInstance, AlertStatus, DeliveryRecord, MetricsRecord,
    PatientId, Result, RuleId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::AlertRule;

pub use memory::InMemoryStore;

// ── Traits ──────────────────────────────────────────────────────────

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Every active rule that could be read. Rules whose stored form no
    /// longer parses are reported in [`ActiveRules::unreadable`] instead of
    /// failing the listing.
    async fn list_active_rules(&self) -> Result<ActiveRules>;
    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>>;
    async fn list_rules_by_owner(&self, owner: UserId) -> Result<Vec<AlertRule>>;
    /// Insert or replace by id.
    async fn upsert_rule(&self, rule: &AlertRule) -> Result<()>;
    /// Returns `false` when no rule has that id.
    async fn set_rule_active(&self, id: RuleId, active: bool, at: DateTime<Utc>) -> Result<bool>;
}

/// Source of the externally computed metric snapshots.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn latest_metrics(&self, patient: PatientId) -> Result<Option<MetricsRecord>>;
}

/// Clinician ↔ patient linkage.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Patients linked to `owner` with `active` status.
    async fn active_patients(&self, owner: UserId) -> Result<Vec<PatientId>>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Most recent `triggered_at` for the pair at or before `now`.
    async fn latest_trigger(
        &self,
        rule: RuleId,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Insert `alert` unless the same (rule, patient) already has an alert
    /// triggered within `window_minutes` before `alert.triggered_at`.
    /// Check and insert are atomic. A zero window always inserts.
    async fn insert_alert_unless_recent(
        &self,
        alert: &AlertInstance,
        window_minutes: u32,
    ) -> Result<InsertOutcome>;

    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertInstance>>;

    /// Compare-and-set: apply `update` only if the alert is currently in
    /// `expected`. Returns the updated alert, or `None` if it is missing or
    /// its status moved on.
    async fn update_status(
        &self,
        id: AlertId,
        expected: AlertStatus,
        update: &StatusUpdate,
    ) -> Result<Option<AlertInstance>>;

    /// Newest first, at most `filter.limit_or_default()`.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertInstance>>;

    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()>;

    /// Oldest first.
    async fn list_deliveries(&self, alert: AlertId) -> Result<Vec<DeliveryRecord>>;
}

// ── Shared types ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ActiveRules {
    pub rules: Vec<AlertRule>,
    pub unreadable: Vec<UnreadableRule>,
}

impl From<Vec<AlertRule>> for ActiveRules {
    fn from(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            unreadable: Vec::new(),
        }
    }
}

/// A stored rule that could not be turned back into an [`AlertRule`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableRule {
    pub id: RuleId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// A recent alert for the pair already exists; nothing was written.
    Duplicate,
}

/// Fields written by a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: AlertStatus,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a clinician ↔ patient link. Only `active` links put a patient
/// in an owner's fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Active,
    Inactive,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Active => "active",
            LinkStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "active" => Ok(LinkStatus::Active),
            "inactive" => Ok(LinkStatus::Inactive),
            other => Err(AlertError::Validation(format!("unknown link status '{}'", other))),
        }
    }
}

/// The four repositories the engine components consume, as shared handles.
#[derive(Clone)]
pub struct Repositories {
    pub rules: Arc<dyn RuleRepository>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub patients: Arc<dyn PatientDirectory>,
    pub alerts: Arc<dyn AlertRepository>,
}

impl Repositories {
    /// All four roles served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RuleRepository + MetricsProvider + PatientDirectory + AlertRepository + 'static,
    {
        Self {
            rules: store.clone(),
            metrics: store.clone(),
            patients: store.clone(),
            alerts: store,
        }
    }
}
