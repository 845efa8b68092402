// src/domain/diff.rs

use serde_json::{Map, Value};
use std::collections::{btree_map, BTreeSet, HashMap};
use tracing::warn;

use super::changes::{ChangeKind, ChangeRecord, FieldChange, FieldChanges};
use super::{Entity, Timestamp};

/// Compares the fresh upstream list against the previous snapshot.
///
/// Emission order is all additions (in `new` order), then removals (in `old`
/// order), then field changes (in `new` order). A `Changed` record is only
/// produced when at least one leaf differs.
pub fn diff(new: &[Entity], old: &[Entity], at: Timestamp) -> Vec<ChangeRecord> {
    let old_by_id: HashMap<&str, &Entity> = old.iter().map(|e| (e.id(), e)).collect();
    let new_by_id: HashMap<&str, &Entity> = new.iter().map(|e| (e.id(), e)).collect();

    let mut out = Vec::new();

    for entity in new {
        if !old_by_id.contains_key(entity.id()) {
            out.push(ChangeRecord::added(entity, at));
        }
    }

    for entity in old {
        if !new_by_id.contains_key(entity.id()) {
            out.push(ChangeRecord::removed(entity, at));
        }
    }

    for entity in new {
        let Some(previous) = old_by_id.get(entity.id()) else {
            continue;
        };
        let changes = diff_objects(previous.fields(), entity.fields());
        if !changes.is_empty() {
            out.push(ChangeRecord {
                id: entity.id().to_string(),
                kind: ChangeKind::Changed { changes },
                timestamp: at,
            });
        }
    }

    out
}

/// Structural diff of two JSON trees, keyed by dotted leaf path.
#[cfg(test)]
fn diff_values(old: &Value, new: &Value) -> FieldChanges {
    let mut out = FieldChanges::new();
    walk("", old, new, &mut out);
    out
}

fn diff_objects(old: &Map<String, Value>, new: &Map<String, Value>) -> FieldChanges {
    let mut out = FieldChanges::new();
    walk_objects("", old, new, &mut out);
    out
}

fn walk(path: &str, old: &Value, new: &Value, out: &mut FieldChanges) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => walk_objects(path, a, b, out),
        // Equal-length arrays are compared element-wise; anything else that
        // differs is recorded whole at this path.
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (index, (x, y)) in a.iter().zip(b).enumerate() {
                walk(&join(path, &index.to_string()), x, y, out);
            }
        }
        _ if old == new => {}
        _ => match out.entry(path.to_string()) {
            // A literal dotted key and a nested path can spell the same
            // path; the first one walked wins.
            btree_map::Entry::Occupied(_) => {
                warn!(path, "field path collision, keeping the first change");
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        },
    }
}

fn walk_objects(path: &str, old: &Map<String, Value>, new: &Map<String, Value>, out: &mut FieldChanges) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let a = old.get(key).unwrap_or(&Value::Null);
        let b = new.get(key).unwrap_or(&Value::Null);
        walk(&join(path, key), a, b, out);
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
