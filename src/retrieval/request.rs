//! Search request decoding
//!
//! Payloads come from other services and from hand-written CLI input, so
//! decoding never fails: malformed fields fall back to their defaults.

use crate::config::SearchConfig;
use crate::store::MetadataFilter;
use serde_json::Value;

/// Parameters of one multi-query search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub question: String,
    /// Explicit queries; empty means "derive from the question"
    pub queries: Vec<String>,
    pub final_n: usize,
    pub fetch_k: usize,
    pub max_per_source: usize,
    pub filter: Option<MetadataFilter>,
    pub keep_debug_fields: bool,
    /// Expand the question when no explicit queries are given
    pub expand: bool,
}

impl SearchRequest {
    /// A plain question with configured defaults
    pub fn new(question: impl Into<String>, defaults: &SearchConfig) -> Self {
        Self {
            question: question.into(),
            queries: Vec::new(),
            final_n: defaults.final_n,
            fetch_k: defaults.fetch_k,
            max_per_source: defaults.max_per_source,
            filter: None,
            keep_debug_fields: false,
            expand: false,
        }
    }

    /// Decode a loosely-typed JSON payload
    ///
    /// - `question` or `q`
    /// - `queries`: a list; anything else is ignored, nulls are dropped and
    ///   non-string entries are stringified
    /// - `top_k` or `final_n`, `fetch_k`, `max_per_source`: positive integers
    ///   as numbers or numeric strings, otherwise the default
    /// - `where`: kept only when it is a non-empty object
    /// - `keep_debug_fields`, `expand`: truthy values
    pub fn from_payload(payload: &Value, defaults: &SearchConfig) -> Self {
        let field = |name: &str| payload.get(name).filter(|v| truthy(v));

        let question = field("question")
            .or_else(|| field("q"))
            .map(stringify)
            .unwrap_or_default();

        let queries = match payload.get("queries") {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(stringify)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            question,
            queries,
            final_n: positive_int(field("top_k").or_else(|| field("final_n")))
                .unwrap_or(defaults.final_n),
            fetch_k: positive_int(payload.get("fetch_k")).unwrap_or(defaults.fetch_k),
            // An explicit 0 (or a negative) admits no source at all
            max_per_source: non_negative_int(payload.get("max_per_source"))
                .unwrap_or(defaults.max_per_source),
            filter: payload.get("where").and_then(MetadataFilter::from_value),
            keep_debug_fields: payload.get("keep_debug_fields").is_some_and(truthy),
            expand: payload.get("expand").is_some_and(truthy),
        }
    }
}

/// JSON truthiness: null, false, 0, "", [] and {} are false
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Strings verbatim, booleans as `True`/`False`, everything else in its JSON form
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn positive_int(value: Option<&Value>) -> Option<usize> {
    let n = match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    usize::try_from(n).ok().filter(|n| *n > 0)
}

/// Integers as numbers or numeric strings, negatives clamped to 0
fn non_negative_int(value: Option<&Value>) -> Option<usize> {
    let n = match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    Some(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}
