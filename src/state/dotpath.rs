//! Dot-path addressing into JSON documents (`phase.number`, `actions.history.0`).

use serde_json::{Map, Value};

/// Read the value at `path`.
///
/// Object keys and numeric array indices are both accepted. Any missing
/// segment, or a segment that runs into a primitive, yields `None`.
pub fn get_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(doc);
    }
    path.split('.').try_fold(doc, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Return a copy of `doc` with `value` stored at `path`.
///
/// Missing intermediate objects are created and primitives standing in the
/// way are replaced by objects. Inside an array, an index equal to the
/// length appends. The input document is never modified.
pub fn set_value(doc: &Value, path: &str, value: Value) -> Value {
    if path.is_empty() {
        return value;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = doc.clone();
    set_in(&mut out, &segments, value);
    out
}

fn set_in(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if let Value::Array(items) = node
        && let Ok(index) = head.parse::<usize>()
        && index <= items.len()
    {
        if index == items.len() {
            items.push(Value::Null);
        }
        set_in(&mut items[index], rest, value);
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_in(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_and_array_values() {
        let doc = json!({"phase": {"number": "0010"}, "list": [{"a": 1}, {"a": 2}]});
        assert_eq!(get_value(&doc, "phase.number"), Some(&json!("0010")));
        assert_eq!(get_value(&doc, "list.1.a"), Some(&json!(2)));
        assert_eq!(get_value(&doc, ""), Some(&doc));
    }

    #[test]
    fn test_get_missing_paths() {
        let doc = json!({"phase": {"number": "0010"}, "list": [1]});
        assert!(get_value(&doc, "phase.name").is_none());
        assert!(get_value(&doc, "phase.number.deeper").is_none());
        assert!(get_value(&doc, "list.5").is_none());
        assert!(get_value(&doc, "list.x").is_none());
    }

    #[test]
    fn test_set_creates_intermediates_without_mutating_input() {
        let doc = json!({"project": {"name": "demo"}});
        let updated = set_value(&doc, "health.status", json!("ready"));
        assert_eq!(updated["health"]["status"], json!("ready"));
        assert_eq!(updated["project"]["name"], json!("demo"));
        assert!(doc.get("health").is_none());
    }

    #[test]
    fn test_set_replaces_primitive_intermediate() {
        let doc = json!({"phase": "0010"});
        let updated = set_value(&doc, "phase.number", json!("0020"));
        assert_eq!(updated, json!({"phase": {"number": "0020"}}));
    }

    #[test]
    fn test_set_array_index_and_append() {
        let doc = json!({"items": ["a", "b"]});
        let replaced = set_value(&doc, "items.0", json!("z"));
        assert_eq!(replaced["items"], json!(["z", "b"]));
        let appended = set_value(&doc, "items.2", json!("c"));
        assert_eq!(appended["items"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_set_empty_path_returns_value() {
        let doc = json!({"a": 1});
        assert_eq!(set_value(&doc, "", json!(5)), json!(5));
    }
}
