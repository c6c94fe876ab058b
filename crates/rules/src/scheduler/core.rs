//! [`BatchScheduler`]: runs one evaluation pass over every active rule.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use carewatch_core::config::EngineConfig;
use carewatch_core::{AlertError, AlertInstance, AlertPayload, PatientId, Result};
use carewatch_notify::Dispatcher;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::evaluator::ConditionEvaluator;
use crate::guard::DuplicateGuard;
use crate::schema::AlertRule;
use crate::scope::ScopeResolver;
use crate::store::{InsertOutcome, Repositories};

use super::delivery::deliver;
use super::report::{BatchReport, PairOutcome};

/// Apply the engine's store timeout to one store call.
pub(super) async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AlertError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Orchestrates scope resolution, duplicate suppression, evaluation and
/// alert creation. The only component that creates alerts.
///
/// Runs are serialized: a second call waits for the first to finish.
pub struct BatchScheduler {
    repos: Repositories,
    guard: Arc<DuplicateGuard>,
    dispatcher: Arc<Dispatcher>,
    config: EngineConfig,
    run_lock: Mutex<()>,
}

impl BatchScheduler {
    pub fn new(repos: Repositories, dispatcher: Arc<Dispatcher>, config: EngineConfig) -> Self {
        let guard = Arc::new(DuplicateGuard::new(repos.alerts.clone()));
        Self {
            repos,
            guard,
            dispatcher,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn guard(&self) -> &DuplicateGuard {
        &self.guard
    }

    fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.config.store_timeout_ms)
    }

    /// Evaluate every active rule against its patients now.
    pub async fn evaluate_all(&self) -> Result<BatchReport> {
        self.evaluate_all_at(Utc::now()).await
    }

    /// Evaluate as of `now`: alerts are stamped with it and dedup windows
    /// are measured back from it.
    ///
    /// Failing to list active rules is fatal to the run; everything after
    /// that is caught per rule or per pair.
    pub async fn evaluate_all_at(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();
        let mut report = BatchReport::new(now);

        let active = with_timeout(
            "list_active_rules",
            self.store_timeout(),
            self.repos.rules.list_active_rules(),
        )
        .await?;

        for skipped in &active.unreadable {
            report.unreadable_rules += 1;
            report.errors += 1;
            warn!(rule_id = %skipped.id, reason = %skipped.reason, "skipping unreadable rule");
        }

        let mut resolver = ScopeResolver::new(self.repos.patients.clone());
        let mut pairs: Vec<(Arc<AlertRule>, PatientId)> = Vec::new();

        for rule in active.rules {
            report.rules_processed += 1;
            let rule = Arc::new(rule);
            match with_timeout(
                "resolve_patients",
                self.store_timeout(),
                resolver.resolve_patients(&rule),
            )
            .await
            {
                Ok(patients) => pairs.extend(patients.into_iter().map(|p| (rule.clone(), p))),
                Err(e) => {
                    report.errors += 1;
                    warn!(rule_id = %rule.id, error = %e, "scope resolution failed");
                }
            }
        }

        let outcomes: Vec<PairOutcome> = stream::iter(pairs)
            .map(|(rule, patient)| self.evaluate_pair(rule, patient, now))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            rules = report.rules_processed,
            pairs = report.pairs_evaluated,
            created = report.alerts_created,
            skipped = report.alerts_skipped,
            missing_metrics = report.missing_metrics,
            unreadable = report.unreadable_rules,
            errors = report.errors,
            duration_ms = report.duration_ms,
            "batch evaluation complete"
        );

        Ok(report)
    }

    async fn evaluate_pair(
        &self,
        rule: Arc<AlertRule>,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> PairOutcome {
        match self.try_evaluate_pair(&rule, patient, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    rule_id = %rule.id,
                    patient_id = %patient,
                    error = %e,
                    transient = e.is_transient(),
                    "pair evaluation failed"
                );
                PairOutcome::Failed
            }
        }
    }

    async fn try_evaluate_pair(
        &self,
        rule: &AlertRule,
        patient: PatientId,
        now: DateTime<Utc>,
    ) -> Result<PairOutcome> {
        let timeout = self.store_timeout();

        let metrics = match with_timeout(
            "latest_metrics",
            timeout,
            self.repos.metrics.latest_metrics(patient),
        )
        .await?
        {
            Some(m) => m,
            None => {
                debug!(rule_id = %rule.id, patient_id = %patient, "no metrics for patient");
                return Ok(PairOutcome::MissingMetrics);
            }
        };

        // Guard check and alert write form one critical section per pair.
        let pair_lock = self.guard.lock_pair(rule.id, patient).await;

        let duplicate = with_timeout(
            "latest_trigger",
            timeout,
            self.guard
                .is_duplicate_at(rule.id, patient, rule.dedup_window_minutes, now),
        )
        .await?;
        if duplicate {
            debug!(rule_id = %rule.id, patient_id = %patient, "suppressed duplicate alert");
            return Ok(PairOutcome::Duplicate);
        }

        if !ConditionEvaluator::evaluate(&rule.condition, &metrics) {
            return Ok(PairOutcome::NotMatched);
        }

        let payload = AlertPayload {
            rule_name: rule.name.clone(),
            rule_definition: rule.definition_json()?,
            metrics: metrics.to_json(),
        };
        let alert = AlertInstance::new(rule.id, patient, payload, now);

        let inserted = match with_timeout(
            "insert_alert",
            timeout,
            self.repos
                .alerts
                .insert_alert_unless_recent(&alert, rule.dedup_window_minutes),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e @ AlertError::Timeout { .. }) => self.reconcile_insert(&alert, e).await?,
            Err(e) => return Err(e),
        };
        drop(pair_lock);

        if inserted == InsertOutcome::Duplicate {
            debug!(rule_id = %rule.id, patient_id = %patient, "store reported a recent alert");
            return Ok(PairOutcome::Duplicate);
        }

        info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            rule_name = %rule.name,
            patient_id = %patient,
            "alert created"
        );

        deliver(
            &self.dispatcher,
            self.repos.alerts.as_ref(),
            rule,
            &alert,
            now,
            timeout,
        )
        .await;

        Ok(PairOutcome::Created(alert.id))
    }

    /// An insert that timed out may still have committed. Look the alert up
    /// by id: if it was stored, carry on as created so it still gets its
    /// deliveries; otherwise report the original timeout.
    async fn reconcile_insert(
        &self,
        alert: &AlertInstance,
        timed_out: AlertError,
    ) -> Result<InsertOutcome> {
        let stored = with_timeout(
            "get_alert",
            self.store_timeout(),
            self.repos.alerts.get_alert(alert.id),
        )
        .await;
        match stored {
            Ok(Some(_)) => {
                warn!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    patient_id = %alert.patient_id,
                    "alert insert timed out but the alert was stored"
                );
                Ok(InsertOutcome::Created)
            }
            Ok(None) => Err(timed_out),
            Err(e) => {
                debug!(alert_id = %alert.id, error = %e, "could not check a timed-out insert");
                Err(timed_out)
            }
        }
    }
}
