//! Predicate matcher: evaluates a filter directly against a document.
//!
//! This is the system's single predicate semantics. It confirms candidates
//! produced by index plans, implements full scans, and routes change events
//! to watch subscribers.
//!
//! Missing paths make every comparison non-matching, with one exception:
//! `IsNull` treats "missing" and "present with a null value" as equivalent.

use crate::filter::Filter;
use crate::types::value::compare_values;
use crate::types::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// `true` when the document satisfies the filter. `None` matches everything.
pub fn matches(filter: Option<&Filter>, doc: &Document) -> bool {
    match filter {
        Some(filter) => filter_matches(filter, doc),
        None => true,
    }
}

/// Recursive evaluation of a filter tree against one document.
pub fn filter_matches(filter: &Filter, doc: &Document) -> bool {
    match filter {
        Filter::Eq(field, value) => compare(doc, field, value, |o| o == Ordering::Equal),
        Filter::Ne(field, value) => compare(doc, field, value, |o| o != Ordering::Equal),
        Filter::Lt(field, value) => compare(doc, field, value, |o| o == Ordering::Less),
        Filter::Lte(field, value) => compare(doc, field, value, |o| o != Ordering::Greater),
        Filter::Gt(field, value) => compare(doc, field, value, |o| o == Ordering::Greater),
        Filter::Gte(field, value) => compare(doc, field, value, |o| o != Ordering::Less),
        Filter::In(field, values) => doc
            .get_path(field)
            .map(|v| values.iter().any(|w| compare_values(v, w) == Ordering::Equal))
            .unwrap_or(false),
        Filter::NotIn(field, values) => doc
            .get_path(field)
            .map(|v| values.iter().all(|w| compare_values(v, w) != Ordering::Equal))
            .unwrap_or(false),
        Filter::IsNull(field) => match doc.get_path(field) {
            Some(value) => value.is_null(),
            None => true,
        },
        Filter::IsNotNull(field) => doc.get_path(field).map(|v| !v.is_null()).unwrap_or(false),
        Filter::And(children) => children.iter().all(|f| filter_matches(f, doc)),
        Filter::Or(children) => children.iter().any(|f| filter_matches(f, doc)),
    }
}

fn compare(doc: &Document, field: &str, value: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    doc.get_path(field)
        .map(|v| accept(compare_values(v, value)))
        .unwrap_or(false)
}
