//! Recursive difference between two JSON documents
//!
//! Used by the toolkit to describe what changed between two entity snapshots.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Add,
    Update,
    Delete,
}

/// One changed location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub kind: DiffKind,
    /// Object keys and array indices from the root
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

impl DiffEntry {
    /// Dotted form of the path (`attributes.brightness`)
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// Compute the changes that turn `old` into `new`
///
/// Objects are compared key by key and arrays index by index; anything else
/// (including a change of type) is reported as a single update.
pub fn diff(old: &Value, new: &Value) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    walk(&mut Vec::new(), old, new, &mut entries);
    entries
}

fn walk(path: &mut Vec<String>, old: &Value, new: &Value, out: &mut Vec<DiffEntry>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                path.push(key.clone());
                match b.get(key) {
                    Some(new_value) => walk(path, old_value, new_value, out),
                    None => out.push(entry(DiffKind::Delete, path, Some(old_value), None)),
                }
                path.pop();
            }
            for (key, new_value) in b {
                if !a.contains_key(key) {
                    path.push(key.clone());
                    out.push(entry(DiffKind::Add, path, None, Some(new_value)));
                    path.pop();
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                path.push(index.to_string());
                match (a.get(index), b.get(index)) {
                    (Some(x), Some(y)) => walk(path, x, y, out),
                    (Some(x), None) => out.push(entry(DiffKind::Delete, path, Some(x), None)),
                    (None, Some(y)) => out.push(entry(DiffKind::Add, path, None, Some(y))),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (a, b) if a != b => out.push(entry(DiffKind::Update, path, Some(a), Some(b))),
        _ => {}
    }
}

fn entry(kind: DiffKind, path: &[String], old: Option<&Value>, new: Option<&Value>) -> DiffEntry {
    DiffEntry {
        kind,
        path: path.to_vec(),
        old: old.cloned(),
        new: new.cloned(),
    }
}
