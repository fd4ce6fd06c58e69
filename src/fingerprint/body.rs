//! Canonical JSON encoding of request bodies with property redaction

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Slot of the root container in the path table
const ROOT: usize = 0;

/// Encode `body` as compact JSON with object keys sorted and the listed
/// property paths left out.
///
/// Paths use dotted segments for word keys (`meta.sentAt`, `items.0.id`) and
/// bracket-quoted segments for anything else (`headers["x-request-id"]`).
/// Array elements may also be addressed as `items[0]`. A removed array
/// element encodes as `null` so the positions of its siblings are unchanged.
///
/// `body` is only read; the caller keeps using it for transport.
pub fn canonicalize_body(body: &Value, removed: &[String]) -> String {
    let mut writer = CanonicalWriter {
        removed: removed.iter().map(String::as_str).collect(),
        paths: vec![String::new()],
        out: String::new(),
    };
    writer.write_value(body, ROOT);
    writer.out
}

struct CanonicalWriter<'a> {
    removed: HashSet<&'a str>,
    /// Property path of every visited container, indexed by slot
    paths: Vec<String>,
    out: String,
}

impl CanonicalWriter<'_> {
    fn write_value(&mut self, value: &Value, slot: usize) {
        match value {
            Value::Object(map) => self.write_object(map, slot),
            Value::Array(items) => self.write_array(items, slot),
            scalar => self.out.push_str(&scalar.to_string()),
        }
    }

    fn write_object(&mut self, map: &Map<String, Value>, slot: usize) {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();

        self.out.push('{');
        let mut first = true;
        for key in keys {
            let path = child_path(&self.paths[slot], key);
            if self.removed.contains(path.as_str()) {
                continue;
            }
            if !first {
                self.out.push(',');
            }
            first = false;
            self.out.push_str(&Value::from(key.as_str()).to_string());
            self.out.push(':');
            self.write_child(&map[key], path);
        }
        self.out.push('}');
    }

    fn write_array(&mut self, items: &[Value], slot: usize) {
        self.out.push('[');
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.out.push(',');
            }
            let index = index.to_string();
            let base = &self.paths[slot];
            let path = child_path(base, &index);
            let bracketed = format!("{base}[{index}]");
            if self.removed.contains(path.as_str()) || self.removed.contains(bracketed.as_str()) {
                self.out.push_str("null");
                continue;
            }
            self.write_child(item, path);
        }
        self.out.push(']');
    }

    fn write_child(&mut self, value: &Value, path: String) {
        if value.is_object() || value.is_array() {
            self.paths.push(path);
            let slot = self.paths.len() - 1;
            self.write_value(value, slot);
        } else {
            self.write_value(value, ROOT);
        }
    }
}

fn is_word(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn child_path(base: &str, key: &str) -> String {
    if is_word(key) {
        if base.is_empty() {
            key.to_string()
        } else {
            format!("{base}.{key}")
        }
    } else {
        format!("{base}[{}]", Value::from(key))
    }
}
