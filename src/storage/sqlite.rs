//! Local SQLite record store.
//!
//! Used by the `local` backend. The database also carries a `credentials`
//! table for the local identity service; it is not reachable through the
//! [`RecordStore`] interface.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};

use super::{Direction, Query, RecordStore, Row, Table};
use crate::{Error, Result};

/// Record store backed by a SQLite database file.
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Check if a database exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL DEFAULT 'developer',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                platform TEXT NOT NULL,
                app_url TEXT,
                config_filename TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS app_controls (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS app_permissions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                UNIQUE (user_id, app_id)
            );

            CREATE TABLE IF NOT EXISTS credentials (
                user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                salt TEXT NOT NULL,
                password_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_apps_created_at ON apps(created_at);
            CREATE INDEX IF NOT EXISTS idx_app_controls_app_id ON app_controls(app_id);
            CREATE INDEX IF NOT EXISTS idx_app_permissions_user_id ON app_permissions(user_id);
            CREATE INDEX IF NOT EXISTS idx_app_permissions_app_id ON app_permissions(app_id);
            "#,
        )?;
        Ok(())
    }

    /// Store (or replace) the password hash for a user.
    pub(crate) fn set_credentials(&self, user_id: &str, salt: &str, hash: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO credentials (user_id, salt, password_hash) VALUES (?1, ?2, ?3)",
                params![user_id, salt, hash],
            )
            .map_err(map_constraint)?;
        Ok(())
    }

    /// Load the (salt, hash) pair for a user.
    pub(crate) fn credentials(&self, user_id: &str) -> Result<Option<(String, String)>> {
        let pair = self
            .conn
            .query_row(
                "SELECT salt, password_hash FROM credentials WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(pair)
    }

    fn fetch_by_id(&self, table: Table, id: &str) -> Result<Option<Row>> {
        Ok(self
            .select(table, &Query::new().eq("id", id))?
            .into_iter()
            .next())
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, table: Table, mut row: Row) -> Result<Row> {
        table.check_row(&row)?;

        if row.get("id").is_none_or(Value::is_null) {
            row.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if table.has_column("created_at") && row.get("created_at").is_none_or(Value::is_null) {
            row.insert("created_at".to_string(), Value::String(timestamp()));
        }

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        self.conn
            .execute(&sql, params_from_iter(row.values().map(to_sql)))
            .map_err(map_constraint)?;

        let id = row
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        tracing::debug!(table = %table, %id, "inserted row");

        self.fetch_by_id(table, &id)?
            .ok_or_else(|| Error::Other(format!("inserted {} row {} vanished", table, id)))
    }

    fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        query.check(table)?;

        let columns = table.columns();
        let mut sql = format!("SELECT {} FROM {} WHERE 1=1", columns.join(", "), table.name());
        for (i, (column, _)) in query.filters().iter().enumerate() {
            sql.push_str(&format!(" AND {} = ?{}", column, i + 1));
        }
        match query.order() {
            Some(order) => {
                let direction = match order.direction {
                    Direction::Ascending => "ASC",
                    Direction::Descending => "DESC",
                };
                sql.push_str(&format!(
                    " ORDER BY {} {}, rowid {}",
                    order.column, direction, direction
                ));
            }
            None => sql.push_str(" ORDER BY rowid ASC"),
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params_from_iter(query.filters().iter().map(|(_, v)| to_sql(v))),
                |row| {
                    let mut map = Row::new();
                    for (i, column) in columns.iter().enumerate() {
                        let value: SqlValue = row.get(i)?;
                        map.insert(column.to_string(), from_sql(value));
                    }
                    Ok(map)
                },
            )?
            .collect::<rusqlite::Result<Vec<Row>>>()?;

        Ok(rows)
    }

    fn update(&self, table: Table, id: &str, mut patch: Row) -> Result<Row> {
        table.check_row(&patch)?;
        patch.remove("id");

        if !patch.is_empty() {
            let assignments: Vec<String> = patch
                .keys()
                .enumerate()
                .map(|(i, column)| format!("{} = ?{}", column, i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                table.name(),
                assignments.join(", "),
                patch.len() + 1
            );

            let mut values: Vec<SqlValue> = patch.values().map(to_sql).collect();
            values.push(SqlValue::Text(id.to_string()));

            let changed = self
                .conn
                .execute(&sql, params_from_iter(values))
                .map_err(map_constraint)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("{} {}", table, id)));
            }
            tracing::debug!(table = %table, id, "updated row");
        }

        self.fetch_by_id(table, id)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", table, id)))
    }

    fn delete(&self, table: Table, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.name());
        let removed = self.conn.execute(&sql, [id])?;
        if removed == 0 {
            tracing::debug!(table = %table, id, "delete of absent row");
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Number(i.into()),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Translate constraint violations into domain errors.
fn map_constraint(err: rusqlite::Error) -> Error {
    use rusqlite::ffi;

    if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
        let detail = message.clone().unwrap_or_else(|| failure.to_string());
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return Error::AlreadyExists(detail);
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return Error::NotFound(format!("referenced record does not exist ({})", detail));
            }
            ffi::SQLITE_CONSTRAINT_NOTNULL | ffi::SQLITE_CONSTRAINT_CHECK => {
                return Error::Validation(detail);
            }
            _ => {}
        }
    }
    Error::Database(err)
}
