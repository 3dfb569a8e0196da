//! Total ordering and path navigation over JSON values.
//!
//! Documents are carried as `serde_json::Value`, which has equality but no
//! ordering. Index levels and range bounds need a total order, so this module
//! defines one: values rank by kind (null < bool < number < string < array <
//! object), numbers compare numerically across integer/float widths, arrays
//! compare element-wise, and objects compare key-then-value.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Newtype over `serde_json::Value` carrying the store's total order.
///
/// Equality is derived from the ordering, so `1` and `1.0` are equal here
/// even though `serde_json` distinguishes their representations.
#[derive(Debug, Clone)]
pub struct OrderedValue(pub Value);

impl OrderedValue {
    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for OrderedValue {
    fn from(value: Value) -> Self {
        OrderedValue(value)
    }
}

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        compare_values(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

/// Rank used to order values of different kinds.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two JSON values under the store's total order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_arrays(x, y),
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// `true` when the two values are equal under the total order.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    // Integer fast paths keep full 64-bit precision; only integer/float
    // mixes fall back to f64.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    if is_integer(a) && is_integer(b) {
        // Reaching here one side is negative and the other exceeds
        // i64::MAX, so the sign decides.
        return if a.as_u64().is_some() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

fn is_integer(n: &Number) -> bool {
    n.as_i64().is_some() || n.as_u64().is_some()
}

fn compare_arrays(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    // serde_json's default Map iterates in sorted key order.
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ord = ka.cmp(kb);
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = compare_values(va, vb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Navigate a dotted path into nested maps and sequences.
///
/// Numeric segments index into arrays: `lookup_path(doc, "items.0.sku")`.
/// Returns `None` when any segment is missing or un-navigable.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a dotted path inside an object, creating intermediate maps as needed.
///
/// A non-object intermediate is replaced by a fresh map, except array
/// elements addressed by an in-range numeric segment, which are descended
/// into in place.
pub fn insert_path(target: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, init)) = segments.split_last() else {
        return;
    };
    let mut current = target;
    for segment in init {
        current = step_into(current, segment);
    }
    match (valid_array_index(current, last), current) {
        (Some(index), Value::Array(items)) => items[index] = value,
        (_, current) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            if let Some(map) = current.as_object_mut() {
                map.insert((*last).to_string(), value);
            }
        }
    }
}

/// Descend one segment, creating an intermediate map when the segment cannot
/// address an existing array element.
fn step_into<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    match (valid_array_index(current, segment), current) {
        (Some(index), Value::Array(items)) => &mut items[index],
        (_, current) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            match current {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                other => other,
            }
        }
    }
}

fn valid_array_index(current: &Value, segment: &str) -> Option<usize> {
    match current {
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .filter(|index| *index < items.len()),
        _ => None,
    }
}

/// Remove a dotted path from an object. Missing paths are a no-op.
pub fn remove_path(target: &mut Value, path: &str) {
    let mut current = target;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        match current {
            Value::Object(map) => {
                if last {
                    map.remove(*segment);
                    return;
                }
                match map.get_mut(*segment) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            Value::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return;
                };
                if last {
                    if index < items.len() {
                        items.remove(index);
                    }
                    return;
                }
                match items.get_mut(index) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cross_width_numeric_order() {
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!(2), &json!(1.5)), Ordering::Greater);
        assert_eq!(compare_values(&json!(-3), &json!(2u64)), Ordering::Less);
    }

    #[test]
    fn test_full_width_integer_order() {
        assert_eq!(
            compare_values(
                &json!(9_007_199_254_740_993i64),
                &json!(9_007_199_254_740_992u64)
            ),
            Ordering::Greater
        );
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(
            compare_values(&json!(u64::MAX), &json!(i64::MIN)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_kind_rank_order() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(9), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!([])), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!({})), Ordering::Less);
    }

    #[test]
    fn test_array_elementwise_order() {
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
        assert_eq!(compare_values(&json!([2]), &json!([1, 9])), Ordering::Greater);
    }

    #[test]
    fn test_object_key_then_value_order() {
        assert_eq!(
            compare_values(&json!({"a": 1}), &json!({"a": 2})),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&json!({"a": 1}), &json!({"b": 0})),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&json!({"a": 1}), &json!({"a": 1, "b": 1})),
            Ordering::Less
        );
    }

    #[test]
    fn test_lookup_path_nested() {
        let doc = json!({"user": {"tags": ["a", "b"], "age": 30}});
        assert_eq!(lookup_path(&doc, "user.age"), Some(&json!(30)));
        assert_eq!(lookup_path(&doc, "user.tags.1"), Some(&json!("b")));
        assert_eq!(lookup_path(&doc, "user.missing"), None);
        assert_eq!(lookup_path(&doc, "user.age.deeper"), None);
    }

    #[test]
    fn test_insert_path_creates_levels() {
        let mut doc = json!({});
        insert_path(&mut doc, "a.b.c", json!(1));
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));

        insert_path(&mut doc, "a.b.c", json!(2));
        assert_eq!(doc, json!({"a": {"b": {"c": 2}}}));
    }

    #[test]
    fn test_insert_path_into_array_element() {
        let mut doc = json!({"items": [{"sku": "x"}]});
        insert_path(&mut doc, "items.0.sku", json!("y"));
        assert_eq!(doc, json!({"items": [{"sku": "y"}]}));
    }

    #[test]
    fn test_insert_path_past_array_bounds_rebuilds_as_map() {
        let mut doc = json!({"items": [1, 2]});
        insert_path(&mut doc, "items.9.sku", json!("y"));
        assert_eq!(doc, json!({"items": {"9": {"sku": "y"}}}));
    }

    #[test]
    fn test_remove_path() {
        let mut doc = json!({"a": {"b": 1, "c": 2}});
        remove_path(&mut doc, "a.b");
        assert_eq!(doc, json!({"a": {"c": 2}}));
        remove_path(&mut doc, "a.missing.deep");
        assert_eq!(doc, json!({"a": {"c": 2}}));
    }
}
