//! Hosted record store over a PostgREST-compatible HTTP API.
//!
//! Conventions follow PostgREST as exposed by Supabase:
//! `GET /rest/v1/{table}?select=*&col=eq.value&order=col.asc`, `POST` and
//! `PATCH` with `Prefer: return=representation`, `DELETE ?id=eq.value`.
//! Requests carry the project API key, and the signed-in user's access token
//! as bearer when there is one so row-level security applies.

use serde_json::Value;
use std::time::Duration;

use super::{Direction, Query, RecordStore, Row, Table};
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Postgres error code for unique violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Record store reached over HTTP.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    bearer: Option<String>,
    agent: ureq::Agent,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bearer: None,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    /// Authenticate requests as a signed-in user.
    pub fn with_bearer(mut self, access_token: Option<String>) -> Self {
        self.bearer = access_token;
        self
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        let bearer = self.bearer.as_deref().unwrap_or(&self.api_key);
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", bearer))
            .set("Accept", "application/json")
    }

    fn rows(
        &self,
        response: std::result::Result<ureq::Response, ureq::Error>,
        table: Table,
    ) -> Result<Vec<Row>> {
        match response {
            Ok(resp) => resp
                .into_json::<Vec<Row>>()
                .map_err(|e| Error::Transport(format!("unreadable {} response: {}", table, e))),
            Err(e) => Err(map_error(e, table)),
        }
    }
}

/// Render a filter value the way PostgREST expects it in `col=eq.value`.
fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn map_error(err: ureq::Error, table: Table) -> Error {
    match err {
        ureq::Error::Status(409, resp) => {
            let body = resp.into_string().unwrap_or_default();
            if body.contains(UNIQUE_VIOLATION) || body.contains("duplicate") {
                Error::AlreadyExists(format!("{}: {}", table, body))
            } else {
                Error::Validation(format!("{}: {}", table, body))
            }
        }
        ureq::Error::Status(404, _) => Error::NotFound(format!("table {}", table)),
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            Error::Transport(format!("HTTP {}: {}", code, body))
        }
        other => Error::Transport(other.to_string()),
    }
}

impl RecordStore for RestStore {
    fn insert(&self, table: Table, row: Row) -> Result<Row> {
        table.check_row(&row)?;
        let response = self
            .authorized(self.agent.post(&self.table_url(table)))
            .set("Prefer", "return=representation")
            .send_json(Value::Object(row));

        self.rows(response, table)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport(format!("{} insert returned no row", table)))
    }

    fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        query.check(table)?;

        let mut request = self
            .authorized(self.agent.get(&self.table_url(table)))
            .query("select", "*");
        for (column, value) in query.filters() {
            request = request.query(column, &format!("eq.{}", filter_text(value)));
        }
        if let Some(order) = query.order() {
            let direction = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            request = request.query("order", &format!("{}.{}", order.column, direction));
        }

        self.rows(request.call(), table)
    }

    fn update(&self, table: Table, id: &str, mut patch: Row) -> Result<Row> {
        table.check_row(&patch)?;
        patch.remove("id");

        let response = self
            .authorized(self.agent.request("PATCH", &self.table_url(table)))
            .query("id", &format!("eq.{}", id))
            .set("Prefer", "return=representation")
            .send_json(Value::Object(patch));

        self.rows(response, table)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} {}", table, id)))
    }

    fn delete(&self, table: Table, id: &str) -> Result<()> {
        // PostgREST answers 204 whether or not a row matched.
        let response = self
            .authorized(self.agent.delete(&self.table_url(table)))
            .query("id", &format!("eq.{}", id))
            .call();

        match response {
            Ok(_) => Ok(()),
            Err(e) => Err(map_error(e, table)),
        }
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }

    fn backend_type(&self) -> &'static str {
        "hosted"
    }
}
