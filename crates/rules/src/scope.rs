//! Expands a rule's scope into the concrete set of patients to evaluate.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use carewatch_core::{AlertError, PatientId, Result, UserId};

use crate::schema::{AlertRule, RuleScope};
use crate::store::PatientDirectory;

/// Resolves rule scopes for one batch run.
///
/// Owner linkage is looked up once per owner and reused for the rest of the
/// run, so every fleet rule of an owner sees the same patient set.
pub struct ScopeResolver {
    directory: Arc<dyn PatientDirectory>,
    owners: HashMap<UserId, BTreeSet<PatientId>>,
}

impl ScopeResolver {
    pub fn new(directory: Arc<dyn PatientDirectory>) -> Self {
        Self {
            directory,
            owners: HashMap::new(),
        }
    }

    /// Patients the rule applies to. An empty set is valid.
    ///
    /// Single-patient rules return their bound patient without re-checking
    /// that the owner is still linked to it.
    pub async fn resolve_patients(&mut self, rule: &AlertRule) -> Result<BTreeSet<PatientId>> {
        match rule.scope {
            RuleScope::SinglePatient => {
                let patient = rule.patient_id.ok_or_else(|| {
                    AlertError::Validation(format!(
                        "single_patient rule {} has no patient_id",
                        rule.id
                    ))
                })?;
                Ok(BTreeSet::from([patient]))
            }
            RuleScope::OwnerFleet => {
                if let Some(cached) = self.owners.get(&rule.owner_user_id) {
                    return Ok(cached.clone());
                }
                let patients: BTreeSet<PatientId> = self
                    .directory
                    .active_patients(rule.owner_user_id)
                    .await?
                    .into_iter()
                    .collect();
                tracing::debug!(
                    owner_id = %rule.owner_user_id,
                    patients = patients.len(),
                    "resolved owner fleet"
                );
                self.owners.insert(rule.owner_user_id, patients.clone());
                Ok(patients)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Comparator, Condition};
    use crate::store::{InMemoryStore, LinkStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn rule(owner: UserId, scope: RuleScope, patient: Option<PatientId>) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            owner_user_id: owner,
            scope,
            patient_id: patient,
            name: "r".into(),
            active: true,
            condition: Condition::predicate("phq9_score", Comparator::Gte, 10_i64),
            dedup_window_minutes: 60,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn owner_fleet_returns_active_links_only() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let (p1, p2, p3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.link_patient(owner, p1, LinkStatus::Active);
        store.link_patient(owner, p2, LinkStatus::Active);
        store.link_patient(owner, p3, LinkStatus::Inactive);

        let mut resolver = ScopeResolver::new(store);
        let patients = resolver
            .resolve_patients(&rule(owner, RuleScope::OwnerFleet, None))
            .await
            .unwrap();
        assert_eq!(patients, BTreeSet::from([p1, p2]));
    }

    #[tokio::test]
    async fn single_patient_skips_linkage() {
        let store = Arc::new(InMemoryStore::new());
        let patient = Uuid::new_v4();
        let mut resolver = ScopeResolver::new(store);
        let patients = resolver
            .resolve_patients(&rule(
                Uuid::new_v4(),
                RuleScope::SinglePatient,
                Some(patient),
            ))
            .await
            .unwrap();
        assert_eq!(patients, BTreeSet::from([patient]));
    }

    #[tokio::test]
    async fn owner_without_patients_is_empty() {
        let mut resolver = ScopeResolver::new(Arc::new(InMemoryStore::new()));
        let patients = resolver
            .resolve_patients(&rule(Uuid::new_v4(), RuleScope::OwnerFleet, None))
            .await
            .unwrap();
        assert!(patients.is_empty());
    }

    struct CountingDirectory {
        calls: AtomicUsize,
        patient: PatientId,
    }

    #[async_trait]
    impl PatientDirectory for CountingDirectory {
        async fn active_patients(&self, _owner: UserId) -> Result<Vec<PatientId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.patient])
        }
    }

    #[tokio::test]
    async fn owner_lookup_is_cached_per_run() {
        let directory = Arc::new(CountingDirectory {
            calls: AtomicUsize::new(0),
            patient: Uuid::new_v4(),
        });
        let owner = Uuid::new_v4();
        let mut resolver = ScopeResolver::new(directory.clone());
        for _ in 0..3 {
            resolver
                .resolve_patients(&rule(owner, RuleScope::OwnerFleet, None))
                .await
                .unwrap();
        }
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        // A new run sees fresh linkage.
        let mut next_run = ScopeResolver::new(directory.clone());
        next_run
            .resolve_patients(&rule(owner, RuleScope::OwnerFleet, None))
            .await
            .unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }
}
