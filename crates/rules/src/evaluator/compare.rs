//! Leaf predicate comparison.
//!
//! Integers and floats compare numerically (integers exactly when both
//! sides are integers). Booleans and text only support `==` / `!=`.
//! Any other pairing is incomparable and every comparator yields false.

use std::cmp::Ordering;

use carewatch_core::{FieldValue, MetricsRecord};

use crate::schema::{Comparator, Predicate};

/// Evaluate one predicate. Missing or null fields are false.
pub fn evaluate_predicate(predicate: &Predicate, metrics: &MetricsRecord) -> bool {
    let Some(actual) = metrics.get(&predicate.field) else {
        return false;
    };

    match predicate.op {
        Comparator::IsTrue => actual.as_bool() == Some(true),
        Comparator::IsFalse => actual.as_bool() == Some(false),
        op => match &predicate.value {
            Some(expected) => compare(actual, op, expected),
            None => false,
        },
    }
}

fn compare(actual: &FieldValue, op: Comparator, expected: &FieldValue) -> bool {
    match ordering(actual, op, expected) {
        Some(ord) => op.holds(ord),
        None => false,
    }
}

fn ordering(actual: &FieldValue, op: Comparator, expected: &FieldValue) -> Option<Ordering> {
    match (actual, expected) {
        (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) if !op.is_ordering() => Some(a.cmp(b)),
        (FieldValue::Text(a), FieldValue::Text(b)) if !op.is_ordering() => Some(a.cmp(b)),
        _ => {
            let (a, b) = (actual.as_f64()?, expected.as_f64()?);
            // NaN is incomparable.
            a.partial_cmp(&b)
        }
    }
}
