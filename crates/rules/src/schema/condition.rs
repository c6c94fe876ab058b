//! Condition tree types: metric predicates and AND/OR groups.

use std::cmp::Ordering;
use std::fmt;

use carewatch_core::{AlertError, FieldValue};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Deepest condition tree accepted by [`Condition::validate`] and by
/// deserialization.
pub const MAX_CONDITION_DEPTH: usize = 512;

/// A predicate leaf or nested AND/OR group.
///
/// Deserialization goes through [`Condition::from_value`], which builds the
/// tree without recursing. JSON text should be parsed with
/// [`carewatch_core::json::from_str`] so deep trees get past serde_json's
/// default nesting limit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    /// Compare one metric field to a literal.
    Predicate(Predicate),
    /// Combine child conditions with a logical operator.
    Group(Composition),
}

/// Leaf node: `{field, op, value}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    pub field: String,
    pub op: Comparator,
    /// Literal to compare against. Absent for `is_true` / `is_false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

/// Interior node: `{operator, conditions}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Composition {
    pub operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

/// Logical operators for condition groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

/// Leaf comparators. Serialized with the symbolic spelling the rule editor
/// emits; word forms are accepted as aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Comparator {
    #[serde(rename = "==", alias = "eq", alias = "equals")]
    Eq,
    #[serde(rename = "!=", alias = "ne", alias = "not_equals")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = "is_true")]
    IsTrue,
    #[serde(rename = "is_false")]
    IsFalse,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::IsTrue => "is_true",
            Comparator::IsFalse => "is_false",
        }
    }

    /// Whether this comparator compares against a literal `value`.
    pub fn takes_literal(&self) -> bool {
        !matches!(self, Comparator::IsTrue | Comparator::IsFalse)
    }

    /// Equality comparators work on every value type; the rest need an order.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte
        )
    }

    /// Whether `actual <op> expected` holds given their ordering.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Gte => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Lte => ordering != Ordering::Greater,
            Comparator::IsTrue | Comparator::IsFalse => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Construction helpers ────────────────────────────────────────────

impl Condition {
    pub fn predicate(field: &str, op: Comparator, value: impl Into<FieldValue>) -> Self {
        Condition::Predicate(Predicate {
            field: field.to_string(),
            op,
            value: Some(value.into()),
        })
    }

    /// `is_true` / `is_false` leaf.
    pub fn flag(field: &str, expected: bool) -> Self {
        Condition::Predicate(Predicate {
            field: field.to_string(),
            op: if expected {
                Comparator::IsTrue
            } else {
                Comparator::IsFalse
            },
            value: None,
        })
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::Group(Composition {
            operator: LogicalOperator::And,
            conditions,
        })
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Group(Composition {
            operator: LogicalOperator::Or,
            conditions,
        })
    }
}

// ── Deserialization ─────────────────────────────────────────────────

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Condition::from_value(value).map_err(de::Error::custom)
    }
}

/// A group whose children are still being converted.
struct OpenGroup {
    operator: LogicalOperator,
    remaining: std::vec::IntoIter<Value>,
    built: Vec<Condition>,
}

enum Node {
    Leaf(Predicate),
    Group(LogicalOperator, Vec<Value>),
}

impl Condition {
    /// Convert a JSON value into a condition tree.
    ///
    /// Uses an explicit stack of open groups, so depth is bounded by
    /// [`MAX_CONDITION_DEPTH`] rather than by the thread's stack.
    pub fn from_value(root: Value) -> Result<Condition, String> {
        let mut open: Vec<OpenGroup> = Vec::new();
        let mut current = root;

        loop {
            if open.len() >= MAX_CONDITION_DEPTH {
                return Err(format!(
                    "condition tree is deeper than {} levels",
                    MAX_CONDITION_DEPTH
                ));
            }
            let mut done = match split_node(current)? {
                Node::Leaf(p) => Condition::Predicate(p),
                Node::Group(operator, children) => {
                    let mut remaining = children.into_iter();
                    match remaining.next() {
                        Some(first) => {
                            open.push(OpenGroup {
                                operator,
                                remaining,
                                built: Vec::new(),
                            });
                            current = first;
                            continue;
                        }
                        None => Condition::Group(Composition {
                            operator,
                            conditions: Vec::new(),
                        }),
                    }
                }
            };

            // Close finished groups until one has a child left to convert.
            loop {
                let Some(mut group) = open.pop() else {
                    return Ok(done);
                };
                group.built.push(done);
                match group.remaining.next() {
                    Some(next) => {
                        open.push(group);
                        current = next;
                        break;
                    }
                    None => {
                        done = Condition::Group(Composition {
                            operator: group.operator,
                            conditions: group.built,
                        })
                    }
                }
            }
        }
    }
}

fn split_node(value: Value) -> Result<Node, String> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(format!(
                "condition must be an object, found {}",
                json_kind(&other)
            ))
        }
    };
    if !map.contains_key("operator") && !map.contains_key("conditions") {
        return serde_json::from_value(Value::Object(map))
            .map(Node::Leaf)
            .map_err(|e| format!("invalid predicate: {}", e));
    }

    let operator = take_key(&mut map, "operator")?;
    let conditions = take_key(&mut map, "conditions")?;
    if let Some(extra) = map.keys().next() {
        return Err(format!(
            "unknown field `{}` in condition group, expected `operator` or `conditions`",
            extra
        ));
    }
    let operator: LogicalOperator = serde_json::from_value(operator)
        .map_err(|e| format!("invalid group operator: {}", e))?;
    match conditions {
        Value::Array(children) => Ok(Node::Group(operator, children)),
        other => Err(format!(
            "group `conditions` must be an array, found {}",
            json_kind(&other)
        )),
    }
}

fn take_key(map: &mut Map<String, Value>, key: &str) -> Result<Value, String> {
    map.remove(key)
        .ok_or_else(|| format!("condition group is missing `{}`", key))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Structural validation ───────────────────────────────────────────

impl Condition {
    /// Check the tree is well-formed without evaluating it.
    ///
    /// Walks the tree with an explicit stack, so over-deep input is rejected
    /// rather than overflowing.
    pub fn validate(&self) -> Result<(), AlertError> {
        let mut stack: Vec<(&Condition, usize)> = vec![(self, 1)];

        while let Some((node, depth)) = stack.pop() {
            if depth > MAX_CONDITION_DEPTH {
                return Err(AlertError::Validation(format!(
                    "condition tree is deeper than {} levels",
                    MAX_CONDITION_DEPTH
                )));
            }
            match node {
                Condition::Predicate(p) => p.validate(depth)?,
                Condition::Group(g) => {
                    if g.conditions.is_empty() {
                        return Err(AlertError::Validation(format!(
                            "'{}' group at depth {} has no conditions",
                            g.operator.as_str(),
                            depth
                        )));
                    }
                    stack.extend(g.conditions.iter().rev().map(|c| (c, depth + 1)));
                }
            }
        }
        Ok(())
    }

    /// Number of levels in the tree (a lone predicate is depth 1).
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            if let Condition::Group(g) = node {
                stack.extend(g.conditions.iter().map(|c| (c, depth + 1)));
            }
        }
        max
    }

    /// Every metric field referenced by the tree, in first-seen order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Condition::Predicate(p) => {
                    if !fields.contains(&p.field.as_str()) {
                        fields.push(&p.field);
                    }
                }
                Condition::Group(g) => stack.extend(g.conditions.iter().rev()),
            }
        }
        fields
    }
}

impl Predicate {
    fn validate(&self, depth: usize) -> Result<(), AlertError> {
        if self.field.trim().is_empty() {
            return Err(AlertError::Validation(format!(
                "predicate at depth {} has an empty field name",
                depth
            )));
        }
        match (&self.value, self.op.takes_literal()) {
            (None, true) => Err(AlertError::Validation(format!(
                "operator '{}' on '{}' requires a value",
                self.op, self.field
            ))),
            (Some(_), false) => Err(AlertError::Validation(format!(
                "operator '{}' on '{}' takes no value",
                self.op, self.field
            ))),
            _ => Ok(()),
        }
    }
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }
}
