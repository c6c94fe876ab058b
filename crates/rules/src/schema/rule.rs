//! Alert rule documents.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use carewatch_core::{json, AlertError, PatientId, RuleId, UserId};
use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::condition::Condition;
use super::window::parse_window;

/// Dedup window applied when a rule does not specify one (24 hours).
pub const DEFAULT_DEDUP_WINDOW_MINUTES: u32 = 1_440;

fn default_dedup_window() -> u32 {
    DEFAULT_DEDUP_WINDOW_MINUTES
}

fn default_true() -> bool {
    true
}

// ── Scope ───────────────────────────────────────────────────────────

/// Which patients a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Exactly the rule's bound `patient_id`.
    #[serde(alias = "per_patient", alias = "single-patient")]
    SinglePatient,
    /// Every patient actively linked to the rule's owner.
    #[serde(alias = "global", alias = "owner-fleet")]
    OwnerFleet,
}

impl RuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleScope::SinglePatient => "single_patient",
            RuleScope::OwnerFleet => "owner_fleet",
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleScope {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_patient" | "per_patient" | "single-patient" => Ok(RuleScope::SinglePatient),
            "owner_fleet" | "global" | "owner-fleet" => Ok(RuleScope::OwnerFleet),
            other => Err(AlertError::Validation(format!("unknown rule scope '{}'", other))),
        }
    }
}

// ── Stored rule ─────────────────────────────────────────────────────

/// A declarative alert rule owned by a clinician.
///
/// Rules are deactivated, never deleted, so alert history keeps pointing
/// at a real rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: RuleId,
    pub owner_user_id: UserId,
    pub scope: RuleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub name: String,
    #[serde(default = "default_true", alias = "is_active")]
    pub active: bool,
    #[serde(alias = "definition", alias = "definition_json")]
    pub condition: Condition,
    #[serde(
        default = "default_dedup_window",
        deserialize_with = "deserialize_window"
    )]
    pub dedup_window_minutes: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn validate(&self) -> Result<(), AlertError> {
        validate_shape(&self.name, self.scope, self.patient_id, &self.condition)
    }

    /// The condition tree as stored in alert payloads.
    pub fn definition_json(&self) -> Result<serde_json::Value, AlertError> {
        Ok(serde_json::to_value(&self.condition)?)
    }
}

// ── Authoring shape ─────────────────────────────────────────────────

/// A rule as submitted by its author: no owner (taken from the caller's
/// identity) and no timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDraft {
    /// Set to update an existing rule; omitted to create one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    pub name: String,
    pub scope: RuleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    #[serde(default = "default_true", alias = "is_active")]
    pub active: bool,
    #[serde(alias = "definition", alias = "definition_json")]
    pub condition: Condition,
    #[serde(
        default = "default_dedup_window",
        deserialize_with = "deserialize_window"
    )]
    pub dedup_window_minutes: u32,
}

impl RuleDraft {
    pub fn validate(&self) -> Result<(), AlertError> {
        validate_shape(&self.name, self.scope, self.patient_id, &self.condition)
    }

    /// Materialize as a rule owned by `owner`. `created_at` is taken from
    /// `existing` when updating.
    pub fn into_rule(
        self,
        owner: UserId,
        existing: Option<&AlertRule>,
        now: DateTime<Utc>,
    ) -> Result<AlertRule, AlertError> {
        self.validate()?;
        Ok(AlertRule {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            owner_user_id: owner,
            scope: self.scope,
            patient_id: self.patient_id,
            name: self.name.trim().to_string(),
            active: self.active,
            condition: self.condition,
            dedup_window_minutes: self.dedup_window_minutes,
            created_at: existing.map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        })
    }

    /// Parse a rule file, choosing YAML or JSON by extension.
    pub fn from_file(path: &Path) -> Result<Self, AlertError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AlertError::Validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        parse_document(&text, is_json)
            .map_err(|msg| AlertError::Validation(format!("{}: {}", path.display(), msg)))
    }
}

/// Parse a bare condition tree (JSON or YAML), as used by the test harness CLI.
pub fn condition_from_str(text: &str, json: bool) -> Result<Condition, AlertError> {
    parse_document(text, json).map_err(AlertError::Validation)
}

/// JSON goes through the deep-nesting parser. serde_yaml keeps its fixed
/// nesting limit, so a YAML tree that hits it is pointed at JSON instead.
fn parse_document<T: DeserializeOwned>(text: &str, json: bool) -> Result<T, String> {
    if json {
        return json::from_str(text).map_err(|e| e.to_string());
    }
    serde_yaml::from_str(text).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("recursion limit") {
            format!("{} (write deeply nested condition trees as JSON)", msg)
        } else {
            msg
        }
    })
}

fn validate_shape(
    name: &str,
    scope: RuleScope,
    patient_id: Option<PatientId>,
    condition: &Condition,
) -> Result<(), AlertError> {
    if name.trim().is_empty() {
        return Err(AlertError::Validation("rule name must not be empty".into()));
    }
    match (scope, patient_id) {
        (RuleScope::SinglePatient, None) => {
            return Err(AlertError::Validation(
                "single_patient rules require a patient_id".into(),
            ))
        }
        (RuleScope::OwnerFleet, Some(_)) => {
            return Err(AlertError::Validation(
                "owner_fleet rules must not bind a patient_id".into(),
            ))
        }
        _ => {}
    }
    condition.validate()
}

// ── Dedup window (integer minutes or duration string) ───────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum WindowRepr {
    Minutes(u64),
    Text(String),
}

fn deserialize_window<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match WindowRepr::deserialize(deserializer)? {
        WindowRepr::Minutes(m) => u32::try_from(m)
            .map_err(|_| de::Error::custom(format!("dedup window {} minutes is too large", m))),
        WindowRepr::Text(s) => parse_window(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid dedup window '{}'", s))),
    }
}
