//! App detail: one app, its controls, and their live values.
//!
//! The config document is fetched on a scoped thread while the controls are
//! read from the store. A failed fetch never fails the view; it only turns
//! the live values into [`LiveValue::Unavailable`].

use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;
use std::sync::Arc;

use super::{LocalList, ViewScope, can_access_app};
use crate::config_repo::{CommitInfo, ConfigRepository, VersionToken};
use crate::keypath;
use crate::models::{App, Control, NewControl};
use crate::shell::Viewer;
use crate::storage::{Direction, Query, RecordStore, RecordStoreExt};
use crate::{Error, Result};

/// Why a config document is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableKind {
    NotFound,
    Transport,
    Decode,
    NoConfigFile,
    Other,
}

impl From<&Error> for UnavailableKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound(_) => UnavailableKind::NotFound,
            Error::Transport(_) | Error::Io(_) => UnavailableKind::Transport,
            Error::Decode(_) | Error::Json(_) => UnavailableKind::Decode,
            _ => UnavailableKind::Other,
        }
    }
}

/// File-level state of the app's config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfigStatus {
    NotLoaded,
    Loaded {
        filename: String,
        version: VersionToken,
    },
    Unavailable {
        kind: UnavailableKind,
        reason: String,
    },
}

impl ConfigStatus {
    fn unavailable(kind: UnavailableKind, reason: impl Into<String>) -> Self {
        ConfigStatus::Unavailable {
            kind,
            reason: reason.into(),
        }
    }
}

/// Key-level state of one control's value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum LiveValue {
    /// The key resolved in the loaded document
    Present(Value),
    /// The document loaded but has no such key
    Missing,
    /// The document itself could not be loaded
    Unavailable,
}

impl LiveValue {
    /// Text shown for the value in human output.
    pub fn display(&self) -> String {
        match self {
            LiveValue::Present(value) => keypath::render(value),
            LiveValue::Missing => "(key not found)".to_string(),
            LiveValue::Unavailable => "(live value unavailable)".to_string(),
        }
    }
}

/// A control together with its live value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlView {
    #[serde(flatten)]
    pub control: Control,
    pub live: LiveValue,
}

/// Result of configuring a control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub control_id: String,
    pub key_name: String,
    pub previous: Option<Value>,
    pub value: Value,
    pub commit: CommitInfo,
}

type Fetched = (ConfigStatus, Option<Value>);

fn fetch_config(repo: &dyn ConfigRepository, filename: Option<&str>) -> Fetched {
    let Some(filename) = filename else {
        return (
            ConfigStatus::unavailable(UnavailableKind::NoConfigFile, "no config file set for this app"),
            None,
        );
    };

    match repo.fetch(filename) {
        Ok(doc) => (
            ConfigStatus::Loaded {
                filename: filename.to_string(),
                version: doc.version,
            },
            Some(doc.content),
        ),
        Err(e) => {
            tracing::warn!(filename, error = %e, "config document unavailable");
            (ConfigStatus::unavailable(UnavailableKind::from(&e), e.to_string()), None)
        }
    }
}

pub struct AppDetailView {
    store: Rc<dyn RecordStore>,
    repo: Arc<dyn ConfigRepository>,
    viewer: Viewer,
    scope: ViewScope,
    app_id: String,
    app: Option<App>,
    controls: LocalList<Control>,
    config: ConfigStatus,
    document: Option<Value>,
}

impl AppDetailView {
    pub fn new(
        store: Rc<dyn RecordStore>,
        repo: Arc<dyn ConfigRepository>,
        viewer: Viewer,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            repo,
            viewer,
            scope: ViewScope::new(),
            app_id: app_id.into(),
            app: None,
            controls: LocalList::default(),
            config: ConfigStatus::NotLoaded,
            document: None,
        }
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn app(&self) -> Option<&App> {
        self.app.as_ref()
    }

    pub fn config_status(&self) -> &ConfigStatus {
        &self.config
    }

    /// Controls, oldest first, with their live values.
    pub fn controls(&self) -> Vec<ControlView> {
        self.controls
            .iter()
            .map(|control| ControlView {
                live: self.live_value(&control.key_name),
                control: control.clone(),
            })
            .collect()
    }

    fn live_value(&self, key_name: &str) -> LiveValue {
        match &self.document {
            None => LiveValue::Unavailable,
            Some(doc) => match keypath::resolve(Some(doc), key_name) {
                Some(value) => LiveValue::Present(value.clone()),
                None => LiveValue::Missing,
            },
        }
    }

    /// Load the app, its controls, and its config document.
    ///
    /// Returns `false` when the view was left (or reloaded) before the
    /// results arrived; nothing is applied in that case.
    pub fn load(&mut self) -> Result<bool> {
        self.load_with(true)
    }

    /// Load the app and its controls, leaving the config document unfetched.
    ///
    /// Enough for `set_value`, which fetches the document itself.
    pub fn load_controls(&mut self) -> Result<bool> {
        self.load_with(false)
    }

    fn load_with(&mut self, with_config: bool) -> Result<bool> {
        if !can_access_app(self.store.as_ref(), &self.viewer, &self.app_id)? {
            return Err(Error::Forbidden(format!(
                "no access to app {}",
                self.app_id
            )));
        }

        let ticket = self.scope.begin();
        let app: App = self.store.get_record(&self.app_id)?;

        let store = self.store.as_ref();
        let repo = self.repo.as_ref();
        let filename = app.config_file();
        let oldest_first = Query::new()
            .eq("app_id", app.id.as_str())
            .order_by("created_at", Direction::Ascending);

        let (controls, (config, document)) = std::thread::scope(|s| {
            let fetch = s.spawn(move || {
                if with_config {
                    fetch_config(repo, filename)
                } else {
                    (ConfigStatus::NotLoaded, None)
                }
            });
            let controls = store.select_records::<Control>(&oldest_first);
            let fetched = fetch.join().unwrap_or_else(|_| {
                (
                    ConfigStatus::unavailable(UnavailableKind::Other, "config fetch panicked"),
                    None,
                )
            });
            (controls, fetched)
        });

        if ticket.accept(()).is_none() {
            return Ok(false);
        }
        let controls = controls?;

        tracing::debug!(
            app_id = %app.id,
            controls = controls.len(),
            loaded = document.is_some(),
            "app detail loaded"
        );
        self.controls.replace_all(controls);
        self.config = config;
        self.document = document;
        self.app = Some(app);
        Ok(true)
    }

    /// Define a control on this app (admin only).
    pub fn add_control(
        &mut self,
        name: &str,
        key_name: &str,
        description: Option<&str>,
    ) -> Result<Control> {
        self.viewer.require_admin("adding a control")?;
        let mut new_control = NewControl {
            app_id: self.app_id.clone(),
            name: name.to_string(),
            key_name: key_name.to_string(),
            description: description.map(str::to_string),
        };
        new_control.validate()?;

        let control: Control = self.store.insert_record(&new_control)?;
        tracing::info!(control_id = %control.id, key = %control.key_name, "added control");
        self.controls.append(control.clone()).confirm(None);
        Ok(control)
    }

    /// Delete a control of this app (admin only).
    pub fn remove_control(&mut self, control_id: &str) -> Result<()> {
        self.viewer.require_admin("removing a control")?;

        let pending = self
            .controls
            .remove_where(|c| c.id == control_id)
            .ok_or_else(|| Error::NotFound(format!("control {} on app {}", control_id, self.app_id)))?;

        match self.store.delete_record::<Control>(control_id) {
            Ok(()) => {
                pending.confirm(None);
                tracing::info!(control_id, "removed control");
                Ok(())
            }
            Err(e) => {
                pending.rollback();
                Err(e)
            }
        }
    }

    /// Write `value` at a control's key path and commit the document.
    ///
    /// Allowed for admins and for developers granted this app. The document
    /// is fetched fresh and committed with the token from that fetch, so a
    /// concurrent writer surfaces as `VersionConflict`.
    pub fn set_value(
        &mut self,
        control_id: &str,
        value: Value,
        message: Option<&str>,
    ) -> Result<ValueChange> {
        if !can_access_app(self.store.as_ref(), &self.viewer, &self.app_id)? {
            return Err(Error::Forbidden(format!(
                "no access to app {}",
                self.app_id
            )));
        }

        let control = self
            .controls
            .find(|c| c.id == control_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("control {} on app {}", control_id, self.app_id)))?;
        let filename = self
            .app
            .as_ref()
            .and_then(App::config_file)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Validation(format!("app {} has no config file set", self.app_id))
            })?;

        let doc = self.repo.fetch(&filename)?;
        let mut content = doc.content;
        let previous = keypath::assign(&mut content, &control.key_name, value.clone())?;
        let commit = self
            .repo
            .commit(&filename, &content, &doc.version, message)?;

        tracing::info!(
            filename = %filename,
            key = %control.key_name,
            version = %commit.version,
            "committed control value"
        );
        self.config = ConfigStatus::Loaded {
            filename,
            version: commit.version.clone(),
        };
        self.document = Some(content);

        Ok(ValueChange {
            control_id: control.id,
            key_name: control.key_name,
            previous,
            value,
            commit,
        })
    }
}
