//! Typed predicate representation.
//!
//! Compiled trial criteria are expressed as a tree of field conditions
//! combined with and/or. Adapters render this into their native query
//! language; the in-memory adapter evaluates it directly.

use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{Result, StoreError};

/// A stored document. Dates are ISO `YYYY-MM-DD` strings, so range
/// conditions on them reduce to string comparison.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldCond {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    /// Matches when any pattern finds a match in the field's text.
    Regex {
        patterns: Vec<String>,
        case_insensitive: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document.
    True,
    Field(String, FieldCond),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn field(name: impl Into<String>, cond: FieldCond) -> Self {
        Predicate::Field(name.into(), cond)
    }

    pub fn and(preds: Vec<Predicate>) -> Self {
        Predicate::And(preds)
    }

    pub fn or(preds: Vec<Predicate>) -> Self {
        Predicate::Or(preds)
    }

    /// Evaluate against a document. Only adapters should need this.
    pub fn matches(&self, doc: &Document) -> Result<bool> {
        match self {
            Predicate::True => Ok(true),
            Predicate::Field(name, cond) => cond.matches(doc.get(name.as_str())),
            Predicate::And(preds) => {
                for p in preds {
                    if !p.matches(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(preds) => {
                for p in preds {
                    if p.matches(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl FieldCond {
    fn matches(&self, value: Option<&Value>) -> Result<bool> {
        // Null and absent are interchangeable in the snapshot documents.
        let value = value.filter(|v| !v.is_null());
        match self {
            FieldCond::Exists(want) => Ok(value.is_some() == *want),
            // Negated conditions match documents lacking the field.
            FieldCond::Ne(rhs) => Ok(match value {
                Some(v) => !values_equal(v, rhs),
                None => true,
            }),
            FieldCond::Nin(set) => Ok(match value {
                Some(v) => !set.iter().any(|rhs| values_equal(v, rhs)),
                None => true,
            }),
            FieldCond::Eq(rhs) => Ok(value.is_some_and(|v| values_equal(v, rhs))),
            FieldCond::In(set) => {
                Ok(value.is_some_and(|v| set.iter().any(|rhs| values_equal(v, rhs))))
            }
            FieldCond::Gt(rhs) => Ok(cmp(value, rhs) == Some(Ordering::Greater)),
            FieldCond::Gte(rhs) => {
                Ok(matches!(cmp(value, rhs), Some(Ordering::Greater | Ordering::Equal)))
            }
            FieldCond::Lt(rhs) => Ok(cmp(value, rhs) == Some(Ordering::Less)),
            FieldCond::Lte(rhs) => {
                Ok(matches!(cmp(value, rhs), Some(Ordering::Less | Ordering::Equal)))
            }
            FieldCond::Regex {
                patterns,
                case_insensitive,
            } => {
                let Some(text) = value.and_then(Value::as_str) else {
                    return Ok(false);
                };
                for pattern in patterns {
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(*case_insensitive)
                        .build()
                        .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;
                    if re.is_match(text) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Equality with numeric coercion (ints and floats compare by value).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn cmp(value: Option<&Value>, rhs: &Value) -> Option<Ordering> {
    let value = value?;
    if let (Some(x), Some(y)) = (value.as_f64(), rhs.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (value.as_str(), rhs.as_str()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
