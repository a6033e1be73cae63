//! Deep merge for JSON documents.

use serde_json::Value;

/// Merge `source` into `target`.
///
/// Objects are merged key by key, recursively. Any other source value
/// (including arrays) replaces the target value.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(key) {
                        deep_merge(existing, value);
                    }
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_nested_objects() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        deep_merge(&mut target, &json!({"b": {"d": 4, "e": 5}, "f": 6}));
        assert_eq!(target, json!({"a": 1, "b": {"c": 2, "d": 4, "e": 5}, "f": 6}));
    }

    #[test]
    fn arrays_and_scalars_replace() {
        let mut target = json!({"list": [1, 2], "n": {"x": 1}});
        deep_merge(&mut target, &json!({"list": [3], "n": 7}));
        assert_eq!(target, json!({"list": [3], "n": 7}));
    }

    #[test]
    fn non_object_target_is_replaced() {
        let mut target = Value::Null;
        deep_merge(&mut target, &json!({"a": 1}));
        assert_eq!(target, json!({"a": 1}));
    }
}
