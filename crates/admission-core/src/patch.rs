//! Structural patch generation.
//!
//! Both sides are serialised to `serde_json::Value` and walked in parallel.
//! Output order is the traversal order:
//! - object keys in ascending order, each key yielding `remove`, `add` or
//!   the operations of its recursive diff;
//! - array elements by index over the common prefix, then `add` for extra
//!   trailing elements in ascending index order, or `remove` for surplus
//!   elements from the highest index down;
//! - any other difference becomes a single `replace` of the whole value.
//!
//! Arrays are compared positionally, never by content.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;

/// A single JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOperation::Add {
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        PatchOperation::Replace {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        PatchOperation::Remove { path: path.into() }
    }

    /// JSON pointer this operation targets.
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path } => path,
        }
    }

    /// Operation name as it appears on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            PatchOperation::Add { .. } => "add",
            PatchOperation::Replace { .. } => "replace",
            PatchOperation::Remove { .. } => "remove",
        }
    }
}

/// Escape one reference token for use in a JSON pointer.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Operations that transform `before` into `after`.
///
/// Serialisation failure of either side fails the whole call.
pub fn diff<B, A>(before: &B, after: &A) -> Result<Vec<PatchOperation>>
where
    B: Serialize + ?Sized,
    A: Serialize + ?Sized,
{
    let before = serde_json::to_value(before)?;
    let after = serde_json::to_value(after)?;
    Ok(diff_values(&before, &after))
}

/// Diff the raw JSON an object arrived as against its current typed form.
pub fn diff_from_raw<A>(original_json: &[u8], current: &A) -> Result<Vec<PatchOperation>>
where
    A: Serialize + ?Sized,
{
    let before: Value = serde_json::from_slice(original_json)?;
    let after = serde_json::to_value(current)?;
    Ok(diff_values(&before, &after))
}

/// Operations that transform one JSON tree into another.
pub fn diff_values(before: &Value, after: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at(&mut String::new(), before, after, &mut ops);
    METRICS.add_patch_ops(ops.len());
    obs::emit_patches_generated(ops.len(), None);
    ops
}

/// Drop every operation whose path starts with `prefix`.
///
/// The match is a plain string prefix, so `/spec/network` also drops
/// `/spec/networkSpec/...`.
pub fn filter_by_path_prefix(patches: Vec<PatchOperation>, prefix: &str) -> Vec<PatchOperation> {
    let before = patches.len();
    let kept: Vec<PatchOperation> = patches
        .into_iter()
        .filter(|op| !op.path().starts_with(prefix))
        .collect();
    if kept.len() != before {
        obs::emit_patches_generated(kept.len(), Some(prefix));
    }
    kept
}

/// Convert to the `json_patch` crate's representation.
pub fn into_json_patch(patches: &[PatchOperation]) -> Result<json_patch::Patch> {
    let raw = serde_json::to_value(patches)?;
    Ok(serde_json::from_value(raw)?)
}

fn diff_at(path: &mut String, before: &Value, after: &Value, ops: &mut Vec<PatchOperation>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => diff_objects(path, b, a, ops),
        (Value::Array(b), Value::Array(a)) => diff_arrays(path, b, a, ops),
        _ if before == after => {}
        _ => ops.push(PatchOperation::replace(path.clone(), after.clone())),
    }
}

fn diff_objects(
    path: &mut String,
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    ops: &mut Vec<PatchOperation>,
) {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    for key in keys {
        let len = path.len();
        path.push('/');
        path.push_str(&escape_pointer_token(key));
        match (before.get(key), after.get(key)) {
            (Some(b), Some(a)) => diff_at(path, b, a, ops),
            (Some(_), None) => ops.push(PatchOperation::remove(path.clone())),
            (None, Some(a)) => ops.push(PatchOperation::add(path.clone(), a.clone())),
            (None, None) => {}
        }
        path.truncate(len);
    }
}

fn diff_arrays(
    path: &mut String,
    before: &[Value],
    after: &[Value],
    ops: &mut Vec<PatchOperation>,
) {
    let common = before.len().min(after.len());
    let len = path.len();

    for (i, (b, a)) in before.iter().zip(after).enumerate() {
        path.push_str(&format!("/{}", i));
        diff_at(path, b, a, ops);
        path.truncate(len);
    }

    for (i, a) in after.iter().enumerate().skip(common) {
        ops.push(PatchOperation::add(format!("{}/{}", path, i), a.clone()));
    }

    for i in (common..before.len()).rev() {
        ops.push(PatchOperation::remove(format!("{}/{}", path, i)));
    }
}
