//! Dotted key paths over decoded JSON documents.
//!
//! A key path such as `ads.banner` names one property per segment. Array
//! indices and escaped dots are not supported: `items.0` looks up a property
//! literally named `0`, which arrays do not have.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Resolve `path` against `document`.
///
/// Returns `None` when the document is absent, the path is empty, or any
/// segment walks into something that is not an object (including `null`).
/// A `null` leaf is returned as a value.
pub fn resolve<'a>(document: Option<&'a Value>, path: &str) -> Option<&'a Value> {
    let document = document?;
    if path.is_empty() {
        return None;
    }

    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Write `value` at `path`, returning the value it replaced.
///
/// Missing intermediate objects are created. Walking through an existing
/// value that is not an object is rejected rather than overwritten.
pub fn assign(document: &mut Value, path: &str, value: Value) -> Result<Option<Value>> {
    if path.is_empty() {
        return Err(Error::Validation("key path is empty".to_string()));
    }

    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| Error::Validation("key path is empty".to_string()))?;

    let mut current = document
        .as_object_mut()
        .ok_or_else(|| Error::Validation("config document is not an object".to_string()))?;

    for (depth, segment) in parents.iter().enumerate() {
        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = next.as_object_mut().ok_or_else(|| {
            Error::Validation(format!(
                "'{}' is not an object",
                segments[..=depth].join(".")
            ))
        })?;
    }

    Ok(current.insert(last.to_string(), value))
}

/// Format a live value for display.
///
/// Strings render verbatim; objects and arrays as indented JSON; other
/// scalars as their JSON text.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
