//! Read and write helpers over an in-memory JSON document tree.
//!
//! Writes follow the realtime-store rules: writing `null` (or an empty
//! container) deletes the key, deleting the last child of a node removes the
//! node, and writing below a scalar replaces the scalar with a mapping.

use serde_json::{Map, Value};

use super::path::StorePath;

/// Value at `path`, or `Null` when absent.
#[must_use]
pub fn get_at(root: &Value, path: &StorePath) -> Value {
    let mut node = root;
    for segment in path.segments() {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Write `value` at `path` in place.
pub fn set_at(root: &mut Value, path: &StorePath, value: Value) {
    let value = if is_empty_value(&value) { Value::Null } else { value };
    if path.is_root() {
        *root = if value.is_null() { Value::Object(Map::new()) } else { value };
        return;
    }
    set_segments(root, path.segments(), value);
}

fn set_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if value.is_null() && !node.is_object() && !node.is_array() {
        return;
    }
    coerce_object(node);
    let Some(map) = node.as_object_mut() else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.shift_remove(head);
        } else {
            map.insert(head.clone(), value);
        }
        return;
    }

    if value.is_null() && !map.contains_key(head) {
        return;
    }
    let child = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    set_segments(child, rest, value);
    if is_empty_value(child) {
        map.shift_remove(head);
    }
}

/// Arrays become index-keyed mappings (null slots dropped); scalars become
/// empty mappings.
fn coerce_object(node: &mut Value) {
    let map = match std::mem::take(node) {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    };
    *node = Value::Object(map);
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.iter().all(Value::is_null),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).expect("path")
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let tree = json!({"a": {"b": [10, 20]}});
        assert_eq!(get_at(&tree, &p("a/b/1")), json!(20));
        assert_eq!(get_at(&tree, &p("a/missing")), Value::Null);
        assert_eq!(get_at(&tree, &p("")), tree);
    }

    #[test]
    fn set_creates_intermediate_nodes() {
        let mut tree = json!({});
        set_at(&mut tree, &p("devices/x/stats/last_fed_pet"), json!("Rex"));
        assert_eq!(tree, json!({"devices": {"x": {"stats": {"last_fed_pet": "Rex"}}}}));
    }

    #[test]
    fn null_deletes_and_prunes_empty_parents() {
        let mut tree = json!({"a": {"b": {"c": 1}}, "keep": true});
        set_at(&mut tree, &p("a/b/c"), Value::Null);
        assert_eq!(tree, json!({"keep": true}));
        // Deleting something absent is a no-op.
        set_at(&mut tree, &p("x/y"), Value::Null);
        assert_eq!(tree, json!({"keep": true}));
    }

    #[test]
    fn replacing_keeps_document_order() {
        let mut tree = json!({"z": 1, "a": 2, "m": 3});
        set_at(&mut tree, &p("a"), json!(5));
        set_at(&mut tree, &p("z"), Value::Null);
        let keys: Vec<&String> = tree.as_object().expect("obj").keys().collect();
        assert_eq!(keys, vec!["a", "m"]);
    }

    #[test]
    fn writing_below_arrays_and_scalars_coerces() {
        let mut tree = json!({"names": ["Rex", null, "Mochi"], "n": 5});
        set_at(&mut tree, &p("names/3"), json!("Yuki"));
        assert_eq!(tree["names"], json!({"0": "Rex", "2": "Mochi", "3": "Yuki"}));
        set_at(&mut tree, &p("n/child"), json!(true));
        assert_eq!(tree["n"], json!({"child": true}));
    }
}
