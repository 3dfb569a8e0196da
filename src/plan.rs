//! Heuristic query planner: filter tree to ordered-range scan plan.
//!
//! Given one index's declared key order and a filter, the planner derives a
//! chain of per-key range bounds, or signals "no plan" (full scan). Plans are
//! over-approximations by construction: every document matching the filter is
//! among the candidates a plan yields, and the predicate matcher re-confirms
//! each candidate. A conservative plan therefore only costs performance,
//! never correctness.

use crate::filter::matcher;
use crate::filter::Filter;
use crate::index::IndexDescriptor;
use crate::types::value::{compare_values, insert_path};
use crate::types::{Document, Result, StoreError};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Range bounds on one index key. Both ends inclusive; an absent end is
/// unbounded. An equality constraint sets both ends to the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl Bounds {
    pub fn unbounded() -> Self {
        Bounds {
            min: None,
            max: None,
        }
    }

    /// Single-point bounds for an equality constraint.
    pub fn point(value: Value) -> Self {
        Bounds {
            min: Some(value.clone()),
            max: Some(value),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// A plan selected for execution: which index to scan and the per-key bounds,
/// aligned with that index's declared key order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPlan {
    pub index: String,
    pub bounds: Vec<Bounds>,
}

/// Count of consecutive leading keys that carry at least one bound. This is
/// the plan's usable length: bounds after the first unbounded position cannot
/// restrict a nested ordered scan.
pub fn bounded_len(bounds: &[Bounds]) -> usize {
    bounds.iter().take_while(|b| !b.is_unbounded()).count()
}

/// Build a bounds chain for one index, or `None` if the filter yields no
/// usable restriction on it.
pub fn plan_for_index(keys: &[String], filter: &Filter) -> Option<Vec<Bounds>> {
    match filter {
        Filter::Eq(field, value) => leaf_plan(keys, field, Bounds::point(value.clone())),
        Filter::Gt(field, value) | Filter::Gte(field, value) => leaf_plan(
            keys,
            field,
            Bounds {
                min: Some(value.clone()),
                max: None,
            },
        ),
        Filter::Lt(field, value) | Filter::Lte(field, value) => leaf_plan(
            keys,
            field,
            Bounds {
                min: None,
                max: Some(value.clone()),
            },
        ),
        // IN(v1..vn) plans as OR(EQ(v1), ..., EQ(vn)).
        Filter::In(field, values) => {
            let children: Vec<Filter> = values
                .iter()
                .map(|v| Filter::Eq(field.clone(), v.clone()))
                .collect();
            plan_for_index(keys, &Filter::Or(children))
        }
        Filter::And(children) => {
            let mut plans = children.iter().filter_map(|c| plan_for_index(keys, c));
            let first = plans.next()?;
            Some(plans.fold(first, |acc, plan| intersect(&acc, &plan)))
        }
        Filter::Or(children) => {
            let mut merged: Option<Vec<Bounds>> = None;
            for child in children {
                // Every branch of an OR must be coverable by the same range,
                // otherwise the scan could miss documents.
                let plan = plan_for_index(keys, child)?;
                merged = Some(match merged {
                    Some(acc) => union(&acc, &plan),
                    None => plan,
                });
            }
            let merged = merged?;
            if merged.iter().all(Bounds::is_unbounded) {
                None
            } else {
                Some(merged)
            }
        }
        // Negations and null checks cannot bound an ordered scan.
        Filter::Ne(..) | Filter::NotIn(..) | Filter::IsNull(..) | Filter::IsNotNull(..) => None,
    }
}

fn leaf_plan(keys: &[String], field: &str, bounds: Bounds) -> Option<Vec<Bounds>> {
    let position = keys.iter().position(|k| k == field)?;
    let mut chain = vec![Bounds::unbounded(); keys.len()];
    chain[position] = bounds;
    Some(chain)
}

/// Position-wise intersection: the tighter bound wins on each side.
fn intersect(a: &[Bounds], b: &[Bounds]) -> Vec<Bounds> {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| Bounds {
            min: pick(&x.min, &y.min, Ordering::Greater),
            max: pick(&x.max, &y.max, Ordering::Less),
        })
        .collect()
}

/// Position-wise union: a bound survives only when both sides agree exactly;
/// any disagreement widens that end to unbounded.
fn union(a: &[Bounds], b: &[Bounds]) -> Vec<Bounds> {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| Bounds {
            min: agree(&x.min, &y.min),
            max: agree(&x.max, &y.max),
        })
        .collect()
}

fn pick(a: &Option<Value>, b: &Option<Value>, prefer: Ordering) -> Option<Value> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if compare_values(x, y) == prefer {
                Some(x.clone())
            } else {
                Some(y.clone())
            }
        }
        (Some(x), None) => Some(x.clone()),
        (None, Some(y)) => Some(y.clone()),
        (None, None) => None,
    }
}

fn agree(a: &Option<Value>, b: &Option<Value>) -> Option<Value> {
    match (a, b) {
        (Some(x), Some(y)) if compare_values(x, y) == Ordering::Equal => Some(x.clone()),
        _ => None,
    }
}

/// Pick the best plan across the given indexes: longest bounded-key chain
/// wins, ties go to declaration order. `None` means a full primary scan.
pub fn select_plan(descriptors: &[IndexDescriptor], filter: Option<&Filter>) -> Option<SelectedPlan> {
    let filter = filter?;
    let mut best: Option<(usize, SelectedPlan)> = None;
    for descriptor in descriptors {
        if !partial_satisfiable(descriptor, filter) {
            continue;
        }
        let Some(bounds) = plan_for_index(&descriptor.keys, filter) else {
            continue;
        };
        let len = bounded_len(&bounds);
        if len == 0 {
            continue;
        }
        let better = match &best {
            Some((best_len, _)) => len > *best_len,
            None => true,
        };
        if better {
            best = Some((
                len,
                SelectedPlan {
                    index: descriptor.name.clone(),
                    bounds,
                },
            ));
        }
    }
    best.map(|(_, plan)| plan)
}

/// A partial index only covers documents matching its predicate, so it is
/// usable only when every document the filter can match is guaranteed to
/// satisfy the predicate. Equality conjuncts are checked by seeding a
/// document; every `Or` branch must carry the guarantee on its own, since a
/// single branch without it admits documents the index never indexed.
/// Anything the check cannot reduce disqualifies the index (safe, never
/// incorrect).
fn partial_satisfiable(descriptor: &IndexDescriptor, filter: &Filter) -> bool {
    match &descriptor.partial {
        Some(predicate) => predicate_guaranteed(filter, predicate),
        None => true,
    }
}

fn predicate_guaranteed(filter: &Filter, predicate: &Filter) -> bool {
    if let Filter::Or(children) = filter {
        return !children.is_empty()
            && children.iter().all(|child| predicate_guaranteed(child, predicate));
    }
    let mut equalities = Map::new();
    let mut branches = Vec::new();
    if split_conjunction(filter, &mut equalities, &mut branches).is_err() {
        return false;
    }
    let seeded = match Document::new(seed_document(&equalities)) {
        Ok(seed) => matcher::filter_matches(predicate, &seed),
        Err(_) => false,
    };
    // A nested disjunction can also carry the guarantee for the whole
    // conjunction, since its constraint applies to every match.
    seeded || branches.iter().any(|branch| predicate_guaranteed(branch, predicate))
}

/// Walk a conjunction, gathering `Eq` leaves and deferring `Or` subtrees to
/// the caller. Any other leaf means the conjunction cannot be reduced.
fn split_conjunction<'a>(
    filter: &'a Filter,
    equalities: &mut Map<String, Value>,
    branches: &mut Vec<&'a Filter>,
) -> Result<()> {
    match filter {
        Filter::Eq(field, value) => match equalities.get(field) {
            Some(existing) if compare_values(existing, value) != Ordering::Equal => {
                Err(StoreError::UnsupportedOperation(format!(
                    "conflicting equality constraints on '{field}'"
                )))
            }
            _ => {
                equalities.insert(field.clone(), value.clone());
                Ok(())
            }
        },
        Filter::And(children) => {
            for child in children {
                split_conjunction(child, equalities, branches)?;
            }
            Ok(())
        }
        Filter::Or(_) => {
            branches.push(filter);
            Ok(())
        }
        other => Err(StoreError::UnsupportedOperation(format!(
            "cannot reduce filter to equality constraints: {other:?}"
        ))),
    }
}

/// Flatten a filter into per-field equality constraints.
///
/// An `And`/`Or` of `Eq` leaves on distinct fields reduces to a field map;
/// anything else (ranges, negations, conflicting values for one field) is an
/// unsupported-operation error. Used for upsert seeding.
pub fn extract_equalities(filter: Option<&Filter>) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    if let Some(filter) = filter {
        collect_equalities(filter, &mut out)?;
    }
    Ok(out)
}

fn collect_equalities(filter: &Filter, out: &mut Map<String, Value>) -> Result<()> {
    match filter {
        Filter::Eq(field, value) => match out.get(field) {
            Some(existing) if compare_values(existing, value) != Ordering::Equal => {
                Err(StoreError::UnsupportedOperation(format!(
                    "conflicting equality constraints on '{field}'"
                )))
            }
            _ => {
                out.insert(field.clone(), value.clone());
                Ok(())
            }
        },
        Filter::And(children) | Filter::Or(children) => {
            for child in children {
                collect_equalities(child, out)?;
            }
            Ok(())
        }
        other => Err(StoreError::UnsupportedOperation(format!(
            "cannot reduce filter to equality constraints: {other:?}"
        ))),
    }
}

/// Build a nested document from flat dotted-path equality constraints.
pub fn seed_document(equalities: &Map<String, Value>) -> Value {
    let mut seed = Value::Object(Map::new());
    for (path, value) in equalities {
        insert_path(&mut seed, path, value.clone());
    }
    seed
}
