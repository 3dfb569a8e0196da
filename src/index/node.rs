//! Nested ordered index structure.
//!
//! An n-key index is an n-level tree: each level is an ordered map from one
//! key's value to the next level, and the bottom level is the set of document
//! ids indexed under that key combination. The planner restricts the scan one
//! level at a time by handing each level a range bound.

use crate::plan::Bounds;
use crate::types::value::compare_values;
use crate::types::OrderedValue;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// One level of an index structure.
#[derive(Debug, Clone)]
pub enum IndexNode {
    /// Intermediate level, keyed by one indexed field's value.
    Branch(BTreeMap<OrderedValue, IndexNode>),
    /// Bottom level: ids of the documents indexed here.
    Leaf(BTreeSet<OrderedValue>),
}

impl IndexNode {
    /// Root node for a fresh index.
    pub fn root() -> Self {
        IndexNode::Branch(BTreeMap::new())
    }

    fn for_depth(remaining: usize) -> Self {
        if remaining == 0 {
            IndexNode::Leaf(BTreeSet::new())
        } else {
            IndexNode::Branch(BTreeMap::new())
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            IndexNode::Branch(children) => children.is_empty(),
            IndexNode::Leaf(ids) => ids.is_empty(),
        }
    }

    /// Insert an id under the given key chain, creating levels as needed.
    /// Returns the size of the leaf set after insertion (the unique-index
    /// check in the manager rejects sizes greater than one).
    pub fn insert(&mut self, keys: &[OrderedValue], id: OrderedValue) -> usize {
        match self {
            IndexNode::Leaf(ids) => {
                ids.insert(id);
                ids.len()
            }
            IndexNode::Branch(children) => {
                let (first, rest) = keys
                    .split_first()
                    .expect("index key chain shorter than index depth");
                children
                    .entry(first.clone())
                    .or_insert_with(|| IndexNode::for_depth(rest.len()))
                    .insert(rest, id)
            }
        }
    }

    /// Remove an id from the given key chain, pruning levels that become
    /// empty bottom-up. Returns `true` if the id was present.
    pub fn remove(&mut self, keys: &[OrderedValue], id: &OrderedValue) -> bool {
        match self {
            IndexNode::Leaf(ids) => ids.remove(id),
            IndexNode::Branch(children) => {
                let (first, rest) = keys
                    .split_first()
                    .expect("index key chain shorter than index depth");
                let Some(child) = children.get_mut(first) else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.is_empty() {
                    children.remove(first);
                }
                removed
            }
        }
    }

    /// Collect ids reachable within the per-level bounds, in key order.
    /// Levels past the end of `bounds` are scanned unbounded.
    pub fn collect(&self, bounds: &[Bounds], out: &mut Vec<OrderedValue>) {
        match self {
            IndexNode::Leaf(ids) => out.extend(ids.iter().cloned()),
            IndexNode::Branch(children) => {
                let (level, rest) = match bounds.split_first() {
                    Some((level, rest)) => (Some(level), rest),
                    None => (None, bounds),
                };
                // An intersected plan can produce an empty range (min > max);
                // BTreeMap::range panics on inverted bounds.
                if let Some(level) = level {
                    if let (Some(min), Some(max)) = (&level.min, &level.max) {
                        if compare_values(min, max) == std::cmp::Ordering::Greater {
                            return;
                        }
                    }
                }
                let lower = level
                    .and_then(|b| b.min.as_ref())
                    .map(|v| Bound::Included(OrderedValue(v.clone())))
                    .unwrap_or(Bound::Unbounded);
                let upper = level
                    .and_then(|b| b.max.as_ref())
                    .map(|v| Bound::Included(OrderedValue(v.clone())))
                    .unwrap_or(Bound::Unbounded);
                for child in children.range((lower, upper)).map(|(_, c)| c) {
                    child.collect(rest, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ov(value: serde_json::Value) -> OrderedValue {
        OrderedValue(value)
    }

    fn ids(node: &IndexNode, bounds: &[Bounds]) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        node.collect(bounds, &mut out);
        out.into_iter().map(|v| v.0).collect()
    }

    #[test]
    fn test_insert_and_collect_two_levels() {
        let mut root = IndexNode::root();
        root.insert(&[ov(json!("a")), ov(json!(1))], ov(json!("d1")));
        root.insert(&[ov(json!("a")), ov(json!(2))], ov(json!("d2")));
        root.insert(&[ov(json!("b")), ov(json!(1))], ov(json!("d3")));

        assert_eq!(ids(&root, &[]), vec![json!("d1"), json!("d2"), json!("d3")]);
        assert_eq!(
            ids(&root, &[Bounds::point(json!("a"))]),
            vec![json!("d1"), json!("d2")]
        );
        assert_eq!(
            ids(&root, &[Bounds::point(json!("a")), Bounds::point(json!(2))]),
            vec![json!("d2")]
        );
    }

    #[test]
    fn test_range_bounds() {
        let mut root = IndexNode::root();
        for version in 1..=10 {
            root.insert(&[ov(json!(version))], ov(json!(format!("d{version}"))));
        }
        let found = ids(
            &root,
            &[Bounds {
                min: Some(json!(5)),
                max: None,
            }],
        );
        assert_eq!(found.len(), 6);
        assert_eq!(found[0], json!("d5"));
        assert_eq!(found[5], json!("d10"));
    }

    #[test]
    fn test_remove_prunes_empty_levels() {
        let mut root = IndexNode::root();
        root.insert(&[ov(json!("a")), ov(json!(1))], ov(json!("d1")));

        assert!(root.remove(&[ov(json!("a")), ov(json!(1))], &ov(json!("d1"))));
        assert!(!root.remove(&[ov(json!("a")), ov(json!(1))], &ov(json!("d1"))));

        match &root {
            IndexNode::Branch(children) => assert!(children.is_empty()),
            IndexNode::Leaf(_) => panic!("root must stay a branch"),
        }
    }

    #[test]
    fn test_leaf_size_reported_on_insert() {
        let mut root = IndexNode::root();
        assert_eq!(root.insert(&[ov(json!("x"))], ov(json!("d1"))), 1);
        assert_eq!(root.insert(&[ov(json!("x"))], ov(json!("d2"))), 2);
    }
}
