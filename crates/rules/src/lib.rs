//! Rule-based clinical alerting engine.
//!
//! This crate provides:
//! - Condition trees (YAML/JSON) and their evaluation against a patient's
//!   metrics snapshot
//! - Rule scope resolution (single patient or an owner's active fleet)
//! - Duplicate suppression per (rule, patient) within a dedup window
//! - The batch scheduler that creates alerts and records deliveries
//! - Alert status transitions and a dry-run rule tester
//! - Repository traits with an in-memory implementation

pub mod evaluator;
pub mod guard;
pub mod harness;
pub mod lifecycle;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod schema;
pub mod scope;
pub mod store;

pub use evaluator::ConditionEvaluator;
pub use guard::DuplicateGuard;
pub use harness::{RuleTester, TestOutcome};
pub use lifecycle::AlertLifecycle;
pub use registry::RuleRegistry;
pub use scheduler::{BatchReport, BatchScheduler};
pub use schema::{AlertRule, Condition, RuleDraft, RuleScope};
pub use scope::ScopeResolver;
pub use store::{InMemoryStore, Repositories};
