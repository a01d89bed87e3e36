//! Record store for appconfigs data.
//!
//! The store holds four tables:
//!
//! - `users` - accounts and their role
//! - `apps` - registered applications and their config filename
//! - `app_controls` - named key paths inside an app's config
//! - `app_permissions` - (user, app) grants, unique per pair
//!
//! [`RecordStore`] is the object-safe, row-level interface every backend
//! implements. [`RecordStoreExt`] layers typed access on top of it for any
//! model implementing [`Record`].

pub mod backend;
pub mod rest;
pub mod sqlite;

pub use backend::{BackendType, RecordStore};
pub use rest::RestStore;
pub use sqlite::SqliteStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

use crate::{Error, Result};

/// A row as exchanged with a backend: column name to JSON value.
pub type Row = Map<String, Value>;

/// The tables known to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Apps,
    AppControls,
    AppPermissions,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Apps => "apps",
            Table::AppControls => "app_controls",
            Table::AppPermissions => "app_permissions",
        }
    }

    /// Columns of the table, in storage order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => &["id", "email", "role", "created_at"],
            Table::Apps => &[
                "id",
                "name",
                "platform",
                "app_url",
                "config_filename",
                "created_at",
            ],
            Table::AppControls => &[
                "id",
                "app_id",
                "name",
                "key_name",
                "description",
                "created_at",
            ],
            Table::AppPermissions => &["id", "user_id", "app_id"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Reject column names the table does not have.
    pub fn check_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "unknown column '{}' on table {}",
                column,
                self.name()
            )))
        }
    }

    /// Reject rows carrying columns the table does not have.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        row.keys().try_for_each(|column| self.check_column(column))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Sort direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering clause of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Equality filters plus an optional ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only rows where `column` equals `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// Validate every referenced column against `table`.
    pub fn check(&self, table: Table) -> Result<()> {
        for (column, _) in &self.filters {
            table.check_column(column)?;
        }
        if let Some(order) = &self.order {
            table.check_column(&order.column)?;
        }
        Ok(())
    }
}

/// A model stored in one of the record store's tables.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: Table;

    fn id(&self) -> &str;
}

/// Typed access over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    /// Insert a payload and return the stored record.
    fn insert_record<R: Record, N: Serialize + ?Sized>(&self, new: &N) -> Result<R> {
        let row = self.insert(R::TABLE, to_row(new)?)?;
        from_row(row)
    }

    /// Select the records matching `query`.
    fn select_records<R: Record>(&self, query: &Query) -> Result<Vec<R>> {
        self.select(R::TABLE, query)?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Get one record by id.
    fn get_record<R: Record>(&self, id: &str) -> Result<R> {
        self.select_records::<R>(&Query::new().eq("id", id))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} {}", R::TABLE.name(), id)))
    }

    /// Patch one record by id.
    fn update_record<R: Record, P: Serialize + ?Sized>(&self, id: &str, patch: &P) -> Result<R> {
        let row = self.update(R::TABLE, id, to_row(patch)?)?;
        from_row(row)
    }

    /// Delete one record by id; absent records are not an error.
    fn delete_record<R: Record>(&self, id: &str) -> Result<()> {
        self.delete(R::TABLE, id)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// Serialize a payload into a row.
pub fn to_row<T: Serialize + ?Sized>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Validation(format!(
            "record payload must be an object, got {}",
            other
        ))),
    }
}

/// Deserialize a row into a model.
pub fn from_row<R: DeserializeOwned>(row: Row) -> Result<R> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| Error::Decode(format!("unexpected record shape: {}", e)))
}
