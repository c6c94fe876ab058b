//! Batch evaluation of every active rule against its patients.
//!
//! One run fetches the active rules, resolves each rule's patients, and
//! evaluates the resulting (rule, patient) pairs on a bounded worker pool:
//! metrics lookup → duplicate guard → condition → alert write → deliveries.
//! A failing pair is counted and logged; it never aborts the run.

mod core;
mod delivery;
mod report;


pub use self::core::BatchScheduler;
pub use self::report::{BatchReport, PairOutcome};
