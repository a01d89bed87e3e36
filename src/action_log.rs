//! Action log: one JSONL entry per `appcfg` command.
//!
//! Entries go to `action.log` in the data directory. Writing the log never
//! fails the command that produced it; problems are reported as warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const REDACTED: &str = "[REDACTED]";
const SENSITIVE: [&str; 3] = ["password", "token", "secret"];
const MAX_STRING: usize = 100;
const MAX_ARRAY: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionLog {
    pub timestamp: DateTime<Utc>,

    /// Command path, e.g. "control set"
    pub command: String,

    /// Sanitized arguments
    pub args: Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// OS user running the command
    pub user: String,
}

impl ActionLog {
    pub fn new(
        command: &str,
        args: &Value,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.to_string(),
            args: sanitize_args(args),
            success,
            error,
            duration_ms,
            user: current_user(),
        }
    }
}

/// Append `entry` to the log at `path`.
pub fn log_action(path: &Path, entry: &ActionLog) {
    if let Err(e) = append(path, entry) {
        tracing::warn!(path = %path.display(), error = %e, "failed to write action log");
    }
}

fn append(path: &Path, entry: &ActionLog) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Redact secrets and shorten bulky values.
pub fn sanitize_args(args: &Value) -> Value {
    match args {
        Value::Object(map) => {
            let sanitized: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let lower = key.to_lowercase();
                    if is_sensitive(&lower) && !value.is_null() {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), sanitize_args(value))
                    }
                })
                .collect();
            Value::Object(sanitized)
        }
        Value::Array(items) if items.len() > MAX_ARRAY => {
            Value::String(format!("[Array with {} items]", items.len()))
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_args).collect()),
        Value::String(s) => {
            let count = s.chars().count();
            if count > MAX_STRING {
                let head: String = s.chars().take(MAX_STRING - 3).collect();
                Value::String(format!("{}... ({} chars)", head, count))
            } else {
                args.clone()
            }
        }
        _ => args.clone(),
    }
}

/// `api_key` and `store-key` are secrets; `key_name` is not.
fn is_sensitive(key: &str) -> bool {
    SENSITIVE.iter().any(|word| key.contains(word)) || key.ends_with("key")
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
