//! Dry-run a condition tree against one patient's current metrics.
//!
//! Nothing is written: no alert, no delivery, no duplicate check.

use std::sync::Arc;

use carewatch_core::{AlertError, PatientId, Result};
use serde::{Deserialize, Serialize};

use crate::evaluator::ConditionEvaluator;
use crate::schema::Condition;
use crate::store::MetricsProvider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub would_trigger: bool,
    /// The metrics snapshot the condition was evaluated against.
    pub metrics_used: serde_json::Value,
    /// The condition tree as evaluated, echoed back to the author.
    pub definition: serde_json::Value,
}

pub struct RuleTester {
    metrics: Arc<dyn MetricsProvider>,
}

impl RuleTester {
    pub fn new(metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { metrics }
    }

    pub async fn test_rule(&self, condition: &Condition, patient: PatientId) -> Result<TestOutcome> {
        condition.validate()?;

        let metrics = self
            .metrics
            .latest_metrics(patient)
            .await?
            .ok_or_else(|| AlertError::not_found("patient metrics", patient))?;

        let would_trigger = ConditionEvaluator::evaluate(condition, &metrics);
        tracing::debug!(patient_id = %patient, would_trigger, "rule test evaluated");

        Ok(TestOutcome {
            would_trigger,
            metrics_used: metrics.to_json(),
            definition: serde_json::to_value(condition)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Comparator;
    use crate::store::InMemoryStore;
    use carewatch_core::{fields, MetricsRecord};
    use uuid::Uuid;

    fn tester_with(days: i64) -> (Arc<InMemoryStore>, RuleTester, PatientId) {
        let store = Arc::new(InMemoryStore::new());
        let patient = Uuid::new_v4();
        store.put_metrics(
            MetricsRecord::new(patient)
                .with(fields::DAYS_WITHOUT_MEDICATION, days)
                .with(fields::CHECKIN_MISSING_3D, false),
        );
        (store.clone(), RuleTester::new(store), patient)
    }

    fn missed_meds() -> Condition {
        Condition::predicate(fields::DAYS_WITHOUT_MEDICATION, Comparator::Gte, 3_i64)
    }

    #[tokio::test]
    async fn matching_metrics_would_trigger() {
        let (store, tester, patient) = tester_with(5);
        let outcome = tester.test_rule(&missed_meds(), patient).await.unwrap();

        assert!(outcome.would_trigger);
        assert_eq!(outcome.metrics_used["days_without_medication"], 5);
        assert_eq!(outcome.definition["op"], ">=");
        assert_eq!(store.alert_count(), 0);
        assert_eq!(store.delivery_count(), 0);
    }

    #[tokio::test]
    async fn non_matching_metrics_would_not_trigger() {
        let (_store, tester, patient) = tester_with(1);
        let outcome = tester.test_rule(&missed_meds(), patient).await.unwrap();
        assert!(!outcome.would_trigger);
        assert_eq!(outcome.metrics_used["days_without_medication"], 1);
    }

    #[tokio::test]
    async fn missing_metrics_is_not_found() {
        let (_store, tester, _) = tester_with(5);
        let err = tester
            .test_rule(&missed_meds(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_tree_is_rejected_before_lookup() {
        let (_store, tester, _) = tester_with(5);
        let empty = Condition::all(Vec::new());
        // Unknown patient too: validation must fail first.
        let err = tester.test_rule(&empty, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AlertError::Validation(_)));
    }

    #[tokio::test]
    async fn response_uses_camel_case() {
        let (_store, tester, patient) = tester_with(4);
        let outcome = tester.test_rule(&missed_meds(), patient).await.unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["wouldTrigger"], true);
        assert!(json["metricsUsed"].is_object());
    }
}
