//! Condition tree evaluator.
//!
//! Interprets a rule's condition tree against one patient's metric snapshot.
//! Evaluation is total: malformed or missing inputs make a leaf false, they
//! never produce an error.
//!
//! - **Leaves** compare one metric field to a literal (see [`compare`]).
//! - **Groups** combine children with AND / OR and short-circuit.
//!
//! Trees are walked with an explicit frame stack, so nesting depth is
//! bounded by heap, not by the thread's call stack.

mod compare;

use std::slice;

use carewatch_core::MetricsRecord;

use crate::schema::{Composition, Condition, LogicalOperator};

pub use compare::evaluate_predicate;

// ── Condition evaluator ─────────────────────────────────────────────

pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluate `condition` against `metrics`.
    ///
    /// An empty group is false for both operators.
    pub fn evaluate(condition: &Condition, metrics: &MetricsRecord) -> bool {
        match condition {
            Condition::Predicate(p) => evaluate_predicate(p, metrics),
            Condition::Group(group) => evaluate_group(group, metrics),
        }
    }
}

/// One group being evaluated: its operator and the children not yet visited.
struct Frame<'a> {
    operator: LogicalOperator,
    children: slice::Iter<'a, Condition>,
    empty: bool,
}

impl<'a> Frame<'a> {
    fn new(group: &'a Composition) -> Self {
        Self {
            operator: group.operator,
            children: group.conditions.iter(),
            empty: group.conditions.is_empty(),
        }
    }

    /// Value this group settles on once a child yields `child`, if any.
    fn settle(&self, child: bool) -> Option<bool> {
        match (self.operator, child) {
            (LogicalOperator::And, false) => Some(false),
            (LogicalOperator::Or, true) => Some(true),
            _ => None,
        }
    }

    /// Value of the group when every child was visited without settling.
    fn exhausted(&self) -> bool {
        match self.operator {
            LogicalOperator::And => !self.empty,
            LogicalOperator::Or => false,
        }
    }
}

fn evaluate_group(root: &Composition, metrics: &MetricsRecord) -> bool {
    let mut stack = vec![Frame::new(root)];

    while let Some(top) = stack.last_mut() {
        let settled = match top.children.next() {
            Some(Condition::Group(group)) => {
                stack.push(Frame::new(group));
                continue;
            }
            Some(Condition::Predicate(p)) => match top.settle(evaluate_predicate(p, metrics)) {
                Some(value) => value,
                None => continue,
            },
            None => top.exhausted(),
        };

        // The top frame is decided; hand its value to ancestors until one
        // of them still needs more children.
        let mut value = settled;
        loop {
            stack.pop();
            match stack.last() {
                None => return value,
                Some(parent) => match parent.settle(value) {
                    Some(v) => value = v,
                    None => break,
                },
            }
        }
    }

    false
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Comparator;
    use carewatch_core::fields;
    use uuid::Uuid;

    fn metrics() -> MetricsRecord {
        MetricsRecord::new(Uuid::new_v4())
            .with(fields::DAYS_WITHOUT_MEDICATION, 5_i64)
            .with(fields::MOOD_LATEST, 2.5)
            .with(fields::CHECKIN_MISSING_3D, true)
            .with(fields::PHQ9_SCORE, None::<i64>)
    }

    fn gte(field: &str, v: i64) -> Condition {
        Condition::predicate(field, Comparator::Gte, v)
    }

    #[test]
    fn and_all_pass() {
        let c = Condition::all(vec![
            gte(fields::DAYS_WITHOUT_MEDICATION, 3),
            Condition::flag(fields::CHECKIN_MISSING_3D, true),
        ]);
        assert!(ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn and_one_fails() {
        let c = Condition::all(vec![
            gte(fields::DAYS_WITHOUT_MEDICATION, 3),
            gte(fields::DAYS_WITHOUT_MEDICATION, 10),
        ]);
        assert!(!ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn or_one_passes() {
        let c = Condition::any(vec![
            gte(fields::DAYS_WITHOUT_MEDICATION, 10),
            Condition::predicate(fields::MOOD_LATEST, Comparator::Lt, 3_i64),
        ]);
        assert!(ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn or_none_pass() {
        let c = Condition::any(vec![
            gte(fields::DAYS_WITHOUT_MEDICATION, 10),
            Condition::flag(fields::CHECKIN_MISSING_3D, false),
        ]);
        assert!(!ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn empty_groups_are_false() {
        assert!(!ConditionEvaluator::evaluate(&Condition::all(vec![]), &metrics()));
        assert!(!ConditionEvaluator::evaluate(&Condition::any(vec![]), &metrics()));
    }

    #[test]
    fn nested_groups() {
        // (days >= 10 OR (mood < 3 AND checkin_missing)) AND days >= 1
        let c = Condition::all(vec![
            Condition::any(vec![
                gte(fields::DAYS_WITHOUT_MEDICATION, 10),
                Condition::all(vec![
                    Condition::predicate(fields::MOOD_LATEST, Comparator::Lt, 3_i64),
                    Condition::flag(fields::CHECKIN_MISSING_3D, true),
                ]),
            ]),
            gte(fields::DAYS_WITHOUT_MEDICATION, 1),
        ]);
        assert!(ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn settled_inner_group_propagates() {
        // Inner OR settles true, which does not settle the outer AND.
        let c = Condition::all(vec![
            Condition::any(vec![gte(fields::DAYS_WITHOUT_MEDICATION, 1)]),
            gte(fields::DAYS_WITHOUT_MEDICATION, 99),
        ]);
        assert!(!ConditionEvaluator::evaluate(&c, &metrics()));

        // Inner AND settles false; the outer OR moves on to its next child.
        let c = Condition::any(vec![
            Condition::all(vec![
                gte(fields::DAYS_WITHOUT_MEDICATION, 99),
                gte(fields::DAYS_WITHOUT_MEDICATION, 1),
            ]),
            Condition::flag(fields::CHECKIN_MISSING_3D, true),
        ]);
        assert!(ConditionEvaluator::evaluate(&c, &metrics()));
    }

    #[test]
    fn missing_or_null_field_is_false() {
        let m = metrics();
        for op in [
            Comparator::Eq,
            Comparator::Ne,
            Comparator::Gt,
            Comparator::Gte,
            Comparator::Lt,
            Comparator::Lte,
        ] {
            assert!(!ConditionEvaluator::evaluate(
                &Condition::predicate(fields::PHQ9_SCORE, op, 0_i64),
                &m
            ));
            assert!(!ConditionEvaluator::evaluate(
                &Condition::predicate("not_a_metric", op, 0_i64),
                &m
            ));
        }
        assert!(!ConditionEvaluator::evaluate(&Condition::flag("not_a_metric", true), &m));
        assert!(!ConditionEvaluator::evaluate(&Condition::flag("not_a_metric", false), &m));
    }

    #[test]
    fn deep_nesting_does_not_overflow() {
        let mut c = gte(fields::DAYS_WITHOUT_MEDICATION, 3);
        for i in 0..2_000 {
            c = if i % 2 == 0 {
                Condition::all(vec![c])
            } else {
                Condition::any(vec![gte(fields::DAYS_WITHOUT_MEDICATION, 99), c])
            };
        }
        let result = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(move || {
                let m = metrics();
                let r = ConditionEvaluator::evaluate(&c, &m);
                // Dropping is recursive; hand the tree back to the caller.
                (r, c)
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(result.0);
    }
}
