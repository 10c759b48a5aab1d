//! Chroma-style `where` metadata predicates
//!
//! The remote backend receives the filter verbatim. The local backend
//! evaluates it here. Supported: `{"k": v}` equality, `{"k": {"$op": v}}` with
//! `$eq $ne $gt $gte $lt $lte $in $nin`, and `$and` / `$or` over sub-filters.

use super::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A structured metadata predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(Metadata);

impl MetadataFilter {
    /// Wrap a filter object; an empty object means "no filter"
    pub fn new(map: Metadata) -> Option<Self> {
        if map.is_empty() {
            None
        } else {
            Some(Self(map))
        }
    }

    /// Accept only JSON objects, anything else is dropped
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Self::new(map.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Metadata {
        &self.0
    }

    /// Evaluate against one record's metadata
    pub fn matches(&self, metadata: &Metadata) -> bool {
        eval_object(&self.0, metadata)
    }
}

fn eval_object(filter: &Metadata, metadata: &Metadata) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => eval_list(cond, metadata, true),
        "$or" => eval_list(cond, metadata, false),
        field => eval_field(metadata.get(field), cond),
    })
}

/// `$and` when `require_all`, `$or` otherwise
fn eval_list(cond: &Value, metadata: &Metadata, require_all: bool) -> bool {
    let Value::Array(items) = cond else {
        return false;
    };
    let mut results = items.iter().map(|item| match item {
        Value::Object(sub) => eval_object(sub, metadata),
        _ => false,
    });
    if require_all {
        results.all(|b| b)
    } else {
        results.any(|b| b)
    }
}

fn eval_field(value: Option<&Value>, cond: &Value) -> bool {
    match cond {
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, operand)| eval_op(value, op, operand))
        }
        literal => value.is_some_and(|v| values_equal(v, literal)),
    }
}

fn eval_op(value: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => value.is_some_and(|v| values_equal(v, operand)),
        "$ne" => !value.is_some_and(|v| values_equal(v, operand)),
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$in" => match (value, operand) {
            (Some(v), Value::Array(options)) => options.iter().any(|o| values_equal(v, o)),
            _ => false,
        },
        "$nin" => match (value, operand) {
            (Some(v), Value::Array(options)) => !options.iter().any(|o| values_equal(v, o)),
            (None, Value::Array(_)) => true,
            _ => false,
        },
        unknown => {
            tracing::debug!("Unsupported filter operator {}", unknown);
            false
        }
    }
}

/// Equality with numbers compared by value (`1` equals `1.0`)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (value?, operand) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
