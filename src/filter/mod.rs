//! Filter expression trees.
//!
//! A [`Filter`] is pure data: a boolean tree of comparisons over dotted field
//! paths, combined with `And`/`Or`. Filters are produced by callers (directly
//! or through the map grammar in [`parse`]) and consumed by both the query
//! planner and the predicate matcher. An absent filter (`None` at the API
//! surface) matches every document.
//!
//! # Example
//!
//! ```rust
//! use tidestore::Filter;
//! use serde_json::json;
//!
//! let filter = Filter::field("status")
//!     .eq(json!("active"))
//!     .and(Filter::field("age").gt(json!(18)));
//! ```

pub mod matcher;
pub mod parse;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boolean filter tree over document fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// field == value
    Eq(String, Value),
    /// field != value
    Ne(String, Value),
    /// field < value
    Lt(String, Value),
    /// field <= value
    Lte(String, Value),
    /// field > value
    Gt(String, Value),
    /// field >= value
    Gte(String, Value),
    /// field IN [values]
    In(String, Vec<Value>),
    /// field NOT IN [values]
    NotIn(String, Vec<Value>),
    /// field is absent or null
    IsNull(String),
    /// field is present and non-null
    IsNotNull(String),
    /// all children match
    And(Vec<Filter>),
    /// any child matches
    Or(Vec<Filter>),
}

impl Filter {
    /// Start a leaf comparison on a dotted field path.
    pub fn field(path: impl Into<String>) -> FieldRef {
        FieldRef(path.into())
    }

    /// Combine with another filter under `And`, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Combine with another filter under `Or`, flattening nested `Or`s.
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut children) => {
                children.push(other);
                Filter::Or(children)
            }
            first => Filter::Or(vec![first, other]),
        }
    }
}

/// Builder handle naming the field a leaf comparison applies to.
pub struct FieldRef(String);

impl FieldRef {
    pub fn eq(self, value: Value) -> Filter {
        Filter::Eq(self.0, value)
    }

    pub fn ne(self, value: Value) -> Filter {
        Filter::Ne(self.0, value)
    }

    pub fn lt(self, value: Value) -> Filter {
        Filter::Lt(self.0, value)
    }

    pub fn lte(self, value: Value) -> Filter {
        Filter::Lte(self.0, value)
    }

    pub fn gt(self, value: Value) -> Filter {
        Filter::Gt(self.0, value)
    }

    pub fn gte(self, value: Value) -> Filter {
        Filter::Gte(self.0, value)
    }

    pub fn is_in(self, values: Vec<Value>) -> Filter {
        Filter::In(self.0, values)
    }

    pub fn not_in(self, values: Vec<Value>) -> Filter {
        Filter::NotIn(self.0, values)
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_leaves() {
        assert_eq!(
            Filter::field("age").gt(json!(18)),
            Filter::Gt("age".to_string(), json!(18))
        );
        assert_eq!(
            Filter::field("tag").is_in(vec![json!("a"), json!("b")]),
            Filter::In("tag".to_string(), vec![json!("a"), json!("b")])
        );
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::field("a")
            .eq(json!(1))
            .and(Filter::field("b").eq(json!(2)))
            .and(Filter::field("c").eq(json!(3)));
        match filter {
            Filter::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_or_flattens() {
        let filter = Filter::field("a")
            .eq(json!(1))
            .or(Filter::field("a").eq(json!(2)))
            .or(Filter::field("a").eq(json!(3)));
        match filter {
            Filter::Or(children) => assert_eq!(children.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }
}
