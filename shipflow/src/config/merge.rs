//! Deep merge of JSON configuration trees.

use serde_json::{Map, Value};

/// Merges `patch` into `existing` and returns the result.
///
/// Where both sides hold an object at the same key the merge recurses;
/// anything else in the patch (scalars, arrays, `null`) replaces the existing
/// value wholesale. Keys absent from the patch are kept.
#[must_use]
pub fn deep_merge(existing: &Value, patch: &Value) -> Value {
    let mut merged = existing.clone();
    merge_into(&mut merged, patch);
    merged
}

/// In-place variant of [`deep_merge`].
pub fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => merge_maps(target, patch),
        (target, patch) => *target = patch.clone(),
    }
}

fn merge_maps(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        let both_objects = value.is_object() && target.get(key).is_some_and(Value::is_object);
        match target.get_mut(key) {
            Some(existing) if both_objects => merge_into(existing, value),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge() {
        let existing = json!({"a": {"b": 1, "c": 2}});
        let patch = json!({"a": {"c": 3}});
        assert_eq!(deep_merge(&existing, &patch), json!({"a": {"b": 1, "c": 3}}));
    }

    #[test]
    fn test_arrays_replace() {
        let existing = json!({"a": [1, 2]});
        let patch = json!({"a": [3]});
        assert_eq!(deep_merge(&existing, &patch), json!({"a": [3]}));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let existing = json!({"theme": {"color": "blue"}});
        let patch = json!({"theme": "dark"});
        assert_eq!(deep_merge(&existing, &patch), json!({"theme": "dark"}));
    }

    #[test]
    fn test_object_replaces_scalar() {
        let existing = json!({"theme": "dark"});
        let patch = json!({"theme": {"color": "red"}});
        assert_eq!(deep_merge(&existing, &patch), json!({"theme": {"color": "red"}}));
    }

    #[test]
    fn test_null_replaces() {
        let existing = json!({"logo": {"url": "a.png"}, "title": "Shop"});
        let patch = json!({"logo": null});
        assert_eq!(deep_merge(&existing, &patch), json!({"logo": null, "title": "Shop"}));
    }

    #[test]
    fn test_new_keys_added_and_untouched_kept() {
        let existing = json!({"name": "shop", "pages": {"home": {"title": "Home"}}});
        let patch = json!({"pages": {"about": {"title": "About"}}, "version": 2});
        assert_eq!(
            deep_merge(&existing, &patch),
            json!({
                "name": "shop",
                "pages": {"home": {"title": "Home"}, "about": {"title": "About"}},
                "version": 2
            })
        );
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let existing = json!({"a": {"b": [1, {"c": true}]}});
        assert_eq!(deep_merge(&existing, &json!({})), existing);
    }
}
