//! Structural diff between two rendered trees.
//!
//! Both sides are wrapped as `{"r": tree}` before diffing so the root
//! always has a stable parent key; a root-level type change then surfaces
//! as `replace /r` instead of an unexpressible whole-document replace.
//! The client strips the wrapper before applying to its local root.

use serde_json::{Map, Value, json};

use super::codec::{PatchOp, compress};

/// Wrap a tree under the stable `"r"` root key.
pub fn wrap_root(tree: &Value) -> Value {
    json!({ "r": tree })
}

/// Diff two wrapped trees and compress the result for the wire.
///
/// `None` for `old` is the empty baseline of a fresh session: the whole
/// document surfaces as a single `add /r` op.
pub fn diff(old: Option<&Value>, new: &Value) -> Vec<Value> {
    let old_wrapped = match old {
        Some(tree) => wrap_root(tree),
        None => json!({}),
    };
    compress(&diff_values(&old_wrapped, &wrap_root(new)))
}

/// Produce RFC-6902 ops transforming `old` into `new`.
///
/// Objects diff per key; arrays diff over the common prefix, append with
/// `add`, and drop excess tail indices highest first so index paths stay
/// valid while the client applies in order. A type change is one `replace`.
pub fn diff_values(old: &Value, new: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_at(old, new, "", &mut ops);
    ops
}

fn diff_at(old: &Value, new: &Value, path: &str, ops: &mut Vec<PatchOp>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            diff_objects(old_map, new_map, path, ops);
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            diff_arrays(old_items, new_items, path, ops);
        }
        (old, new) if old == new => {}
        (_, new) => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: new.clone(),
        }),
    }
}

fn diff_objects(old: &Map<String, Value>, new: &Map<String, Value>, path: &str, ops: &mut Vec<PatchOp>) {
    for key in old.keys() {
        if !new.contains_key(key) {
            ops.push(PatchOp::Remove {
                path: child_path(path, key),
            });
        }
    }
    for (key, new_value) in new {
        match old.get(key) {
            None => ops.push(PatchOp::Add {
                path: child_path(path, key),
                value: new_value.clone(),
            }),
            Some(old_value) if old_value == new_value => {}
            Some(old_value) => diff_at(old_value, new_value, &child_path(path, key), ops),
        }
    }
}

fn diff_arrays(old: &[Value], new: &[Value], path: &str, ops: &mut Vec<PatchOp>) {
    let common = old.len().min(new.len());
    for (index, (old_item, new_item)) in old.iter().zip(new).enumerate().take(common) {
        if old_item != new_item {
            diff_at(old_item, new_item, &index_path(path, index), ops);
        }
    }
    for (index, appended) in new.iter().enumerate().skip(common) {
        ops.push(PatchOp::Add {
            path: index_path(path, index),
            value: appended.clone(),
        });
    }
    for index in (common..old.len()).rev() {
        ops.push(PatchOp::Remove {
            path: index_path(path, index),
        });
    }
}

fn child_path(path: &str, key: &str) -> String {
    // JSON pointer escaping: ~ first, then /
    let escaped = key.replace('~', "~0").replace('/', "~1");
    format!("{path}/{escaped}")
}

fn index_path(path: &str, index: usize) -> String {
    format!("{path}/{index}")
}
