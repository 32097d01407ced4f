use serde_json::Value;
use std::collections::BTreeMap;

/// Flattened settings: dotted key paths to scalar values, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    entries: BTreeMap<String, String>,
}

impl ConfigDocument {
    /// Flatten a JSON document. Nested objects expand into `parent.child`
    /// keys at any depth; every other value becomes a leaf.
    pub fn flatten(value: &Value) -> Self {
        let mut entries = BTreeMap::new();
        if let Value::Object(map) = value {
            for (key, child) in map {
                flatten_into(key.clone(), child, &mut entries);
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn flatten_into(key: String, value: &Value, entries: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(format!("{key}.{child_key}"), child, entries);
            }
        }
        Value::String(s) => {
            entries.insert(key, s.clone());
        }
        other => {
            entries.insert(key, other.to_string());
        }
    }
}
