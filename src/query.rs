//! Translate HTTP query-string parameters into a store query: equality filter, projection, sort, skip/limit.

use crate::error::AppError;
use crate::flavor::Flavor;
use crate::store::names::is_field_path;
use crate::store::ID_FIELD;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Parameters with a fixed meaning; every other parameter is an equality filter term.
const RESERVED_PARAMS: &[&str] = &["query", "fields", "sort", "skip", "limit", "upsert"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Structured query built fresh per request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranslatedQuery {
    /// Dotted field path -> required value, combined with AND.
    pub filter: Map<String, Value>,
    /// Fields to keep; `_id` is always kept. None keeps the whole document.
    pub projection: Option<Vec<String>>,
    pub sort: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl TranslatedQuery {
    /// Parse query parameters. Unknown parameters that are not field paths are ignored.
    pub fn translate(params: &HashMap<String, String>, flavor: Flavor) -> Result<Self, AppError> {
        let mut q = TranslatedQuery::default();

        if let Some(raw) = params.get("query") {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| AppError::BadQuery(format!("query must be a JSON object: {}", e)))?;
            let Value::Object(terms) = parsed else {
                return Err(AppError::BadQuery("query must be a JSON object".into()));
            };
            for (field, value) in terms {
                let field = flavor.field_from_client(&field);
                if !is_field_path(&field) {
                    return Err(AppError::BadQuery(format!("invalid field '{}' in query", field)));
                }
                q.filter.insert(field, value);
            }
        }

        // Sorted so that duplicates between `query` and plain params resolve the same way every time.
        let mut plain: Vec<(&String, &String)> = params
            .iter()
            .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
            .collect();
        plain.sort();
        for (field, raw) in plain {
            let field = flavor.field_from_client(field);
            if !is_field_path(&field) {
                tracing::debug!(param = %field, "ignoring unrecognized query parameter");
                continue;
            }
            q.filter.insert(field, scalar_from_param(raw));
        }

        if let Some(raw) = params.get("fields") {
            let fields = split_list(raw);
            for f in &fields {
                if !is_field_path(f) {
                    return Err(AppError::BadQuery(format!("invalid field '{}' in fields", f)));
                }
            }
            if !fields.is_empty() {
                q.projection = Some(fields.iter().map(|f| flavor.field_from_client(f)).collect());
            }
        }

        if let Some(raw) = params.get("sort") {
            for item in split_list(raw) {
                let (field, dir) = match item.strip_prefix('-') {
                    Some(rest) => (rest, SortDirection::Desc),
                    None => (item.strip_prefix('+').unwrap_or(item.as_str()), SortDirection::Asc),
                };
                if !is_field_path(field) {
                    return Err(AppError::BadQuery(format!("invalid sort field '{}'", item)));
                }
                q.sort.push((flavor.field_from_client(field), dir));
            }
        }

        q.skip = parse_count(params, "skip")?;
        q.limit = parse_count(params, "limit")?;
        Ok(q)
    }

    /// Fill in the configured page size when the request gave no limit.
    pub fn with_default_limit(mut self, default_page_size: Option<u32>) -> Self {
        if self.limit.is_none() {
            self.limit = default_page_size.map(u64::from);
        }
        self
    }

    /// True when every filter term matches `doc`. Numbers compare by value, so `1` matches `1.0`.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.filter.iter().all(|(field, want)| {
            lookup_path(doc, field).is_some_and(|have| compare_values(have, want) == Ordering::Equal)
        })
    }

    /// Apply the projection to one document.
    pub fn project(&self, doc: Map<String, Value>) -> Map<String, Value> {
        let Some(fields) = &self.projection else {
            return doc;
        };
        let mut out = Map::new();
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
        for field in fields {
            if let Some(v) = lookup_path(&doc, field) {
                insert_path(&mut out, field, v.clone());
            }
        }
        out
    }
}

/// Place `value` at a dotted path, creating intermediate objects.
fn insert_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            out.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// JSONB btree ordering: null < string < number < boolean < array < object.
/// Numbers compare numerically, so `Equal` here is JSONB equality.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(a, b)| compare_values(a, b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(va, vb)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Resolve a dotted path inside a document.
pub fn lookup_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Numbers, booleans and null are typed; anything else stays a string.
fn scalar_from_param(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_count(params: &HashMap<String, String>, key: &str) -> Result<Option<u64>, AppError> {
    let Some(raw) = params.get(key) else {
        return Ok(None);
    };
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::BadQuery(format!("{} must be an integer, got '{}'", key, raw)))?;
    if n < 0 {
        return Err(AppError::BadQuery(format!("{} must not be negative", key)));
    }
    Ok(Some(n as u64))
}
