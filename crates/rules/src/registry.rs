//! Rule management: create, update, list and deactivate rules.
//!
//! Rules are never hard-deleted; deactivation keeps alert history pointing at
//! a real rule. Only the owner may change a rule.

use std::sync::Arc;

use carewatch_core::{AlertError, Result, RuleId, UserId};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::schema::{AlertRule, RuleDraft};
use crate::store::RuleRepository;

pub struct RuleRegistry {
    rules: Arc<dyn RuleRepository>,
}

impl RuleRegistry {
    pub fn new(rules: Arc<dyn RuleRepository>) -> Self {
        Self { rules }
    }

    /// Create a rule, or update it when `draft.id` names an existing one.
    pub async fn save(&self, actor: Option<UserId>, draft: RuleDraft) -> Result<AlertRule> {
        self.save_at(actor, draft, Utc::now()).await
    }

    pub async fn save_at(
        &self,
        actor: Option<UserId>,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<AlertRule> {
        let actor = require_actor(actor)?;
        draft.validate()?;

        let existing = match draft.id {
            Some(id) => self.rules.get_rule(id).await?,
            None => None,
        };
        if let Some(rule) = &existing {
            ensure_owner(rule, actor)?;
        }

        let rule = draft.into_rule(actor, existing.as_ref(), now)?;
        self.rules.upsert_rule(&rule).await?;
        info!(
            rule_id = %rule.id,
            owner_id = %actor,
            scope = %rule.scope,
            updated = existing.is_some(),
            "rule saved"
        );
        Ok(rule)
    }

    pub async fn get(&self, id: RuleId) -> Result<AlertRule> {
        self.rules
            .get_rule(id)
            .await?
            .ok_or_else(|| AlertError::not_found("rule", id))
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<AlertRule>> {
        self.rules.list_rules_by_owner(owner).await
    }

    /// Deactivate a rule. Deactivating an inactive rule is a no-op.
    pub async fn deactivate(&self, actor: Option<UserId>, id: RuleId) -> Result<AlertRule> {
        let actor = require_actor(actor)?;
        let rule = self.get(id).await?;
        ensure_owner(&rule, actor)?;

        if !rule.active {
            return Ok(rule);
        }
        let now = Utc::now();
        if !self.rules.set_rule_active(id, false, now).await? {
            return Err(AlertError::not_found("rule", id));
        }
        info!(rule_id = %id, owner_id = %actor, "rule deactivated");
        Ok(AlertRule {
            active: false,
            updated_at: now,
            ..rule
        })
    }
}

fn require_actor(actor: Option<UserId>) -> Result<UserId> {
    actor.ok_or_else(|| AlertError::Unauthorized("managing rules requires an actor identity".into()))
}

fn ensure_owner(rule: &AlertRule, actor: UserId) -> Result<()> {
    if rule.owner_user_id != actor {
        return Err(AlertError::Unauthorized(format!(
            "rule {} belongs to another user",
            rule.id
        )));
    }
    Ok(())
}
