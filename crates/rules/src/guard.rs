//! Duplicate suppression for (rule, patient) pairs.
//!
//! A pair is a duplicate while an earlier alert for it sits inside the
//! rule's dedup window. The guard also hands out a per-pair async mutex so
//! a check and the alert write that follows it run as one critical section
//! within this process; the store's atomic insert covers other processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use carewatch_core::{PatientId, Result, RuleId};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::store::AlertRepository;

/// Lock table size above which idle entries are pruned.
const PRUNE_THRESHOLD: usize = 1_024;

type PairKey = (RuleId, PatientId);

pub struct DuplicateGuard {
    alerts: Arc<dyn AlertRepository>,
    locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
}

/// Held while a pair is checked and possibly written.
pub struct PairLock {
    _guard: OwnedMutexGuard<()>,
}

impl DuplicateGuard {
    pub fn new(alerts: Arc<dyn AlertRepository>) -> Self {
        Self {
            alerts,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether raising an alert for the pair now would duplicate one already
    /// raised within `window_minutes`.
    pub async fn is_duplicate(
        &self,
        rule: RuleId,
        patient: PatientId,
        window_minutes: u32,
    ) -> Result<bool> {
        self.is_duplicate_at(rule, patient, window_minutes, Utc::now())
            .await
    }

    /// [`is_duplicate`](Self::is_duplicate) against an explicit instant.
    ///
    /// Useful for testing and deterministic replay.
    pub async fn is_duplicate_at(
        &self,
        rule: RuleId,
        patient: PatientId,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if window_minutes == 0 {
            return Ok(false);
        }
        let latest = self.alerts.latest_trigger(rule, patient, now).await?;
        Ok(latest.is_some_and(|at| now - at <= Duration::minutes(i64::from(window_minutes))))
    }

    /// Acquire the in-process lock for a pair.
    pub async fn lock_pair(&self, rule: RuleId, patient: PatientId) -> PairLock {
        let mutex = {
            let mut locks = self.locks.lock().expect("pair lock table poisoned");
            if locks.len() > PRUNE_THRESHOLD {
                // Only the table holds an idle entry.
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks
                .entry((rule, patient))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        PairLock {
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked_pairs(&self) -> usize {
        self.locks.lock().expect("pair lock table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use carewatch_core::{AlertInstance, AlertPayload};
    use uuid::Uuid;

    async fn seeded(rule: RuleId, patient: PatientId, at: DateTime<Utc>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let alert = AlertInstance::new(
            rule,
            patient,
            AlertPayload {
                rule_name: "r".into(),
                rule_definition: serde_json::json!({}),
                metrics: serde_json::json!({}),
            },
            at,
        );
        store.insert_alert_unless_recent(&alert, 0).await.unwrap();
        store
    }

    #[tokio::test]
    async fn duplicate_inside_window_only() {
        let (rule, patient) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now() - Duration::hours(3);
        let guard = DuplicateGuard::new(seeded(rule, patient, t0).await);

        assert!(guard
            .is_duplicate_at(rule, patient, 60, t0 + Duration::minutes(30))
            .await
            .unwrap());
        assert!(guard
            .is_duplicate_at(rule, patient, 60, t0 + Duration::minutes(60))
            .await
            .unwrap());
        assert!(!guard
            .is_duplicate_at(rule, patient, 60, t0 + Duration::minutes(61))
            .await
            .unwrap());
        assert!(!guard
            .is_duplicate_at(rule, Uuid::new_v4(), 60, t0 + Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn zero_window_disables_suppression() {
        let (rule, patient) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let guard = DuplicateGuard::new(seeded(rule, patient, now).await);
        assert!(!guard.is_duplicate_at(rule, patient, 0, now).await.unwrap());
        assert!(guard.is_duplicate(rule, patient, 5).await.unwrap());
    }

    #[tokio::test]
    async fn alerts_after_the_replay_instant_are_ignored() {
        let (rule, patient) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let guard = DuplicateGuard::new(seeded(rule, patient, t0).await);
        assert!(!guard
            .is_duplicate_at(rule, patient, 60, t0 - Duration::minutes(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn pair_lock_serializes_same_pair() {
        let guard = Arc::new(DuplicateGuard::new(Arc::new(InMemoryStore::new())));
        let (rule, patient) = (Uuid::new_v4(), Uuid::new_v4());

        let held = guard.lock_pair(rule, patient).await;
        let contender = {
            let guard = guard.clone();
            tokio::spawn(async move {
                let _lock = guard.lock_pair(rule, patient).await;
            })
        };
        // A different pair is not blocked.
        let _other = guard.lock_pair(rule, Uuid::new_v4()).await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(held);
        contender.await.unwrap();
        assert_eq!(guard.tracked_pairs(), 2);
    }
}
