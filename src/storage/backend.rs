//! Record store backend trait and implementations.
//!
//! This module provides the backends for appconfigs records:
//! - `SqliteStore` - Local SQLite database (default)
//! - `RestStore` - Hosted PostgREST-compatible store

use serde::{Deserialize, Serialize};

use super::{Query, Row, Table};
use crate::Result;

/// Trait for backends that hold the users, apps, controls, and permissions
/// tables.
///
/// Rows are JSON objects keyed by column name. Callers treat every result as
/// possibly stale: there is no locking and concurrent writers are
/// last-write-wins.
pub trait RecordStore {
    /// Insert a row and return it as stored (with generated columns filled).
    fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Select the rows matching `query`.
    fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>>;

    /// Apply `patch` to the row with `id` and return the updated row.
    fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row>;

    /// Delete the row with `id`. Deleting a row that is already gone succeeds.
    fn delete(&self, table: Table, id: &str) -> Result<()>;

    /// Get the storage location description (for display purposes).
    fn location(&self) -> String;

    /// Get the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Available record store backend types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Local SQLite database in the data directory
    #[default]
    Local,
    /// Hosted store reached over HTTP
    Hosted,
}

impl BackendType {
    /// Parse a backend type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" | "sqlite" | "default" => Some(Self::Local),
            "hosted" | "remote" | "supabase" => Some(Self::Hosted),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hosted => "hosted",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parse() {
        assert_eq!(BackendType::parse("local"), Some(BackendType::Local));
        assert_eq!(BackendType::parse("SQLite"), Some(BackendType::Local));
        assert_eq!(BackendType::parse("hosted"), Some(BackendType::Hosted));
        assert_eq!(BackendType::parse("supabase"), Some(BackendType::Hosted));
        assert_eq!(BackendType::parse("nope"), None);
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(BackendType::Local.to_string(), "local");
        assert_eq!(BackendType::Hosted.to_string(), "hosted");
    }
}
