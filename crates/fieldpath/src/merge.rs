use serde_json::{Map, Value};

/// Field identifying items of keyed lists (`containers`, `env`, `ports` ...)
pub const MERGE_KEY: &str = "name";

fn is_keyed(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.get(MERGE_KEY).is_some())
}

fn merge_objects(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
            continue;
        }
        match target.get_mut(key) {
            Some(existing) => merge(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_keyed(target: &mut Vec<Value>, patch: &[Value]) {
    for item in patch {
        let key = &item[MERGE_KEY];
        match target
            .iter_mut()
            .find(|existing| existing.get(MERGE_KEY) == Some(key))
        {
            Some(existing) => merge(existing, item),
            None => target.push(item.clone()),
        }
    }
}

/// Applies a strategic merge patch the way the API server does for lists keyed by
/// [`MERGE_KEY`]: objects merge recursively, `null` deletes, keyed list items merge
/// by key, everything else is replaced.
pub fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => merge_objects(target, patch),
        (Value::Array(target), Value::Array(patch)) if is_keyed(patch) => {
            merge_keyed(target, patch)
        }
        (target, patch) => *target = patch.clone(),
    }
}
