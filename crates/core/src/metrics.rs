use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PatientId;

/// Well-known metric names produced by the metrics pipeline.
pub mod fields {
    pub const DAYS_WITHOUT_MEDICATION: &str = "days_without_medication";
    pub const MOOD_LATEST: &str = "mood_latest";
    pub const SLEEP_HOURS_AVG_7D: &str = "sleep_hours_avg_7d";
    pub const CHECKIN_MISSING_3D: &str = "checkin_missing_3d";
    pub const PHQ9_SCORE: &str = "phq9_score";
    pub const GAD7_SCORE: &str = "gad7_score";
    pub const SUICIDE_RISK_SCORE: &str = "suicide_risk_score";
}

/// Typed metric values. Snapshot columns are nullable, so `Null` is a
/// first-class value rather than an absent key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`, everything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Null => "null",
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Point-in-time metric snapshot for one patient.
///
/// Read-only to the engine. Lookups through [`MetricsRecord::get`] treat a
/// `Null` value the same as a missing key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub patient_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl MetricsRecord {
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            computed_at: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Non-null value of a field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Flat `{field: value}` object, as stored in alert payloads.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.fields).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// The fixed-column row the metrics pipeline publishes per patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientMetrics {
    pub patient_id: PatientId,
    pub days_without_medication: Option<i64>,
    pub mood_latest: Option<f64>,
    pub sleep_hours_avg_7d: Option<f64>,
    pub checkin_missing_3d: Option<bool>,
    pub phq9_score: Option<i64>,
    pub gad7_score: Option<i64>,
    pub suicide_risk_score: Option<f64>,
}

impl From<PatientMetrics> for MetricsRecord {
    fn from(m: PatientMetrics) -> Self {
        MetricsRecord::new(m.patient_id)
            .with(fields::DAYS_WITHOUT_MEDICATION, m.days_without_medication)
            .with(fields::MOOD_LATEST, m.mood_latest)
            .with(fields::SLEEP_HOURS_AVG_7D, m.sleep_hours_avg_7d)
            .with(fields::CHECKIN_MISSING_3D, m.checkin_missing_3d)
            .with(fields::PHQ9_SCORE, m.phq9_score)
            .with(fields::GAD7_SCORE, m.gad7_score)
            .with(fields::SUICIDE_RISK_SCORE, m.suicide_risk_score)
    }
}
