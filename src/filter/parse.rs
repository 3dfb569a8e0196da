//! Map-grammar filter parsing.
//!
//! Converts the caller-facing filter grammar into a [`Filter`] tree. Keys are
//! either dotted field paths (bare values mean equality) or one of the
//! operators `$eq, $ne, $gt, $gte, $lt, $lte, $in, $nin, $exists, $and, $or`.
//! `$and`/`$or` take sequences of sub-filters. Unknown operators are an
//! unsupported-operation error.
//!
//! ```rust
//! use tidestore::filter::parse::parse_filter;
//! use serde_json::json;
//!
//! let filter = parse_filter(&json!({
//!     "status": "active",
//!     "age": {"$gte": 18, "$lt": 65},
//! })).unwrap();
//! ```

use crate::filter::Filter;
use crate::types::{Result, StoreError};
use serde_json::{Map, Value};

/// Parse the map grammar. `null` and `{}` both mean "match everything".
pub fn parse_filter(value: &Value) -> Result<Option<Filter>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => parse_object(map),
        other => Err(StoreError::UnsupportedType(format!(
            "filter must be an object, got {other}"
        ))),
    }
}

fn parse_object(map: &Map<String, Value>) -> Result<Option<Filter>> {
    let mut clauses = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "$and" => {
                if let Some(filter) = parse_connective(value, key, Filter::And)? {
                    clauses.push(filter);
                }
            }
            "$or" => {
                if let Some(filter) = parse_connective(value, key, Filter::Or)? {
                    clauses.push(filter);
                }
            }
            key if key.starts_with('$') => {
                return Err(StoreError::UnsupportedOperation(format!(
                    "unknown filter operator: {key}"
                )));
            }
            field => {
                if let Some(filter) = parse_field(field, value)? {
                    clauses.push(filter);
                }
            }
        }
    }
    Ok(combine_and(clauses))
}

fn parse_connective(
    value: &Value,
    key: &str,
    connective: fn(Vec<Filter>) -> Filter,
) -> Result<Option<Filter>> {
    let items = value.as_array().ok_or_else(|| {
        StoreError::UnsupportedType(format!("{key} expects an array of sub-filters"))
    })?;
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        if let Some(filter) = parse_filter(item)? {
            children.push(filter);
        }
    }
    Ok(match children.len() {
        0 => None,
        1 => Some(children.into_iter().next().unwrap()),
        _ => Some(connective(children)),
    })
}

fn parse_field(field: &str, value: &Value) -> Result<Option<Filter>> {
    let Some(map) = value.as_object() else {
        // Bare value: implicit equality.
        return Ok(Some(Filter::Eq(field.to_string(), value.clone())));
    };
    if !map.keys().any(|k| k.starts_with('$')) {
        // Nested map with no operators: literal equality on the nested value.
        return Ok(Some(Filter::Eq(field.to_string(), value.clone())));
    }
    let mut clauses = Vec::with_capacity(map.len());
    for (op, operand) in map {
        clauses.push(parse_operator(field, op, operand)?);
    }
    Ok(combine_and(clauses))
}

fn parse_operator(field: &str, op: &str, operand: &Value) -> Result<Filter> {
    let field = field.to_string();
    let filter = match op {
        "$eq" => Filter::Eq(field, operand.clone()),
        "$ne" => Filter::Ne(field, operand.clone()),
        "$gt" => Filter::Gt(field, operand.clone()),
        "$gte" => Filter::Gte(field, operand.clone()),
        "$lt" => Filter::Lt(field, operand.clone()),
        "$lte" => Filter::Lte(field, operand.clone()),
        "$in" => Filter::In(field, operand_list(op, operand)?),
        "$nin" => Filter::NotIn(field, operand_list(op, operand)?),
        "$exists" => match operand.as_bool() {
            Some(true) => Filter::IsNotNull(field),
            Some(false) => Filter::IsNull(field),
            None => {
                return Err(StoreError::UnsupportedType(
                    "$exists expects a boolean".to_string(),
                ))
            }
        },
        other => {
            return Err(StoreError::UnsupportedOperation(format!(
                "unknown filter operator: {other}"
            )))
        }
    };
    Ok(filter)
}

fn operand_list(op: &str, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| StoreError::UnsupportedType(format!("{op} expects an array")))
}

fn combine_and(mut clauses: Vec<Filter>) -> Option<Filter> {
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(Filter::And(clauses)),
    }
}
