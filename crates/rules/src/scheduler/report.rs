//! Per-run counters.

use carewatch_core::AlertId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one (rule, patient) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Created(AlertId),
    /// Suppressed by the dedup window.
    Duplicate,
    NotMatched,
    /// The patient has no metric snapshot yet.
    MissingMetrics,
    Failed,
}

/// Result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub alerts_created: u32,
    /// Pairs suppressed as duplicates.
    pub alerts_skipped: u32,
    pub rules_processed: u32,
    pub pairs_evaluated: u32,
    pub missing_metrics: u32,
    /// Active rules skipped because their stored definition did not parse.
    pub unreadable_rules: u32,
    /// Failed pairs, scope lookups and unreadable rules.
    pub errors: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            alerts_created: 0,
            alerts_skipped: 0,
            rules_processed: 0,
            pairs_evaluated: 0,
            missing_metrics: 0,
            unreadable_rules: 0,
            errors: 0,
            started_at,
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, outcome: PairOutcome) {
        self.pairs_evaluated += 1;
        match outcome {
            PairOutcome::Created(_) => self.alerts_created += 1,
            PairOutcome::Duplicate => self.alerts_skipped += 1,
            PairOutcome::NotMatched => {}
            PairOutcome::MissingMetrics => self.missing_metrics += 1,
            PairOutcome::Failed => self.errors += 1,
        }
    }
}
