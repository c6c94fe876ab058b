//! Rule schema types with serde deserialization.
//!
//! Defines the rule document hierarchy:
//! - `Condition`: boolean tree of metric predicates combined with AND/OR
//! - `AlertRule`: a stored rule (owner, scope, dedup window, condition)
//! - `RuleDraft`: the authoring shape used by the API and rule files
//!
//! Both JSON and YAML are accepted; rule files are parsed by extension.

mod condition;
mod rule;
mod window;

pub use condition::*;
pub use rule::*;
pub use window::parse_window;
