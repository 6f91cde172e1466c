//! Layer merging: objects merge key by key, everything else is replaced.

use serde_json::Value;

/// Fold `layer` into `merged`. Later layers win on conflicting keys.
pub(super) fn merge_layer(merged: &mut Value, layer: Value) {
    match (merged, layer) {
        (Value::Object(target), Value::Object(entries)) => {
            for (key, value) in entries {
                match target.get_mut(&key) {
                    Some(slot) => merge_layer(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}
