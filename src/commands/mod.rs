//! Command implementations for the `appcfg` CLI.
//!
//! Commands are organized by what they act on:
//! - `system` - local data directory and database setup
//! - `session` - login, logout, whoami
//! - `apps` - the dashboard and app detail pages
//! - `controls` - controls and their live values
//! - `developers` - per-app grants and roles
//! - `settings` - config.kdl and state.kdl
//!
//! [`Environment`] loads files and resolves settings without touching any
//! store. [`Context`] builds on it with the record store, identity service,
//! shell, and config repository that the selected backend calls for.

pub mod apps;
pub mod controls;
pub mod developers;
pub mod session;
pub mod settings;
pub mod system;

pub use apps::{app_add, app_list, app_rm, app_show};
pub use controls::{control_add, control_rm, control_set};
pub use developers::{dev_add, dev_grant, dev_list, dev_revoke, dev_role, dev_toggle};
pub use session::{login, logout, whoami};
pub use settings::{config_set, config_show, config_unset};
pub use system::system_init;

use serde::Serialize;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::{
    AppConfig, AppState, Overrides, Paths, Settings, load_config, load_state, resolve_settings,
};
use crate::config_repo::{ConfigRepository, DirRepository, GitHubRepository};
use crate::identity::{IdentityService, LocalIdentity, RemoteIdentity};
use crate::models::{App, User};
use crate::shell::{Route, Shell, Viewer};
use crate::storage::{BackendType, RecordStore, RestStore, SqliteStore};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    fn to_json(&self) -> String;

    fn to_human(&self) -> String;
}

/// Serialize a command result, reporting serializer failures as an error object.
pub(crate) fn json_string<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Files and resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Environment {
    pub paths: Paths,
    pub config: AppConfig,
    pub state: AppState,
    pub settings: Settings,
    overrides: Overrides,
}

impl Environment {
    /// Load from the default (or `APPCFG_*_DIR`) locations.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::from_paths(Paths::from_env()?, overrides)
    }

    pub fn from_paths(paths: Paths, overrides: &Overrides) -> Result<Self> {
        let config = load_config(&paths.config_file())?;
        let state = load_state(&paths.state_file())?;
        let settings = resolve_settings(&config, &state, overrides)?;
        Ok(Self {
            paths,
            config,
            state,
            settings,
            overrides: overrides.clone(),
        })
    }

    pub fn backend(&self) -> BackendType {
        self.settings.backend.value
    }

    /// Load the files again (after a command rewrote them).
    pub fn reload(&self) -> Result<Self> {
        Self::from_paths(self.paths.clone(), &self.overrides)
    }
}

/// Everything a signed-in command needs.
pub struct Context {
    pub env: Environment,
    shell: Shell,
    repo: Arc<dyn ConfigRepository>,
    local: Option<Rc<LocalIdentity>>,
}

impl Context {
    /// Connect to the configured backend and restore the session.
    pub fn open(env: Environment) -> Result<Self> {
        let (shell, local) = match env.backend() {
            BackendType::Local => {
                let db = env.paths.database_file();
                if !SqliteStore::exists(&db) {
                    return Err(Error::NotInitialized);
                }
                let store = Rc::new(SqliteStore::open(&db)?);
                let identity = Rc::new(LocalIdentity::new(
                    Rc::clone(&store),
                    env.paths.state_file(),
                ));
                let shell = Shell::new(identity.clone(), store)?;
                (shell, Some(identity))
            }
            BackendType::Hosted => {
                let url = env.settings.store_url().ok_or_else(|| {
                    Error::Config("the hosted backend needs store-url".to_string())
                })?;
                let key = env.settings.store_key().ok_or_else(|| {
                    Error::Config(
                        "the hosted backend needs store-key (config set store-key <key>)"
                            .to_string(),
                    )
                })?;
                let identity = Rc::new(RemoteIdentity::new(url, key, env.paths.state_file()));
                let bearer = identity.current_session()?.map(|s| s.access_token);
                let store = Rc::new(RestStore::new(url, key).with_bearer(bearer));
                (Shell::new(identity, store)?, None)
            }
        };

        let repo = open_repository(&env.settings);
        tracing::debug!(
            backend = %env.backend().as_str(),
            store = %shell.store().location(),
            repository = %repo.location(),
            "context opened"
        );

        Ok(Self {
            env,
            shell,
            repo,
            local,
        })
    }

    /// Reconnect with freshly loaded files.
    pub fn reload(self) -> Result<Self> {
        let env = self.env.reload()?;
        drop(self);
        Self::open(env)
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn store(&self) -> Rc<dyn RecordStore> {
        self.shell.store()
    }

    pub fn repository(&self) -> Arc<dyn ConfigRepository> {
        Arc::clone(&self.repo)
    }

    /// The viewer allowed on `route`.
    pub fn require(&self, route: &Route) -> Result<Viewer> {
        self.shell.require(route)
    }

    /// The local identity service, for operations only the local backend has.
    pub fn local_identity(&self, action: &str) -> Result<&LocalIdentity> {
        self.local.as_deref().ok_or_else(|| {
            Error::Validation(format!("{} is only available with the local backend", action))
        })
    }
}

/// The config repository the settings point at.
///
/// A configured `repo-dir` wins; otherwise the GitHub contents API is used.
pub fn open_repository(settings: &Settings) -> Arc<dyn ConfigRepository> {
    match &settings.repo_dir {
        Some(dir) => Arc::new(DirRepository::new(dir.value.clone())),
        None => {
            if settings.github_token.is_none() {
                tracing::debug!("no GitHub token configured; config repository calls will fail");
            }
            Arc::new(
                GitHubRepository::new(
                    settings.repo_owner.value.clone(),
                    settings.repo_name.value.clone(),
                )
                .with_token(settings.github_token().map(str::to_string))
                .with_branch(Some(settings.repo_branch.value.clone()))
                .with_api_base(settings.github_api_url.value.clone()),
            )
        }
    }
}

/// Find a user by id or (case-insensitive) email.
pub(crate) fn find_user<'a>(users: &'a [User], needle: &str) -> Result<&'a User> {
    users
        .iter()
        .find(|u| u.id == needle || u.email.eq_ignore_ascii_case(needle))
        .ok_or_else(|| Error::NotFound(format!("user {}", needle)))
}

/// Find an app by id or exact name.
pub(crate) fn find_app<'a>(apps: &'a [App], needle: &str) -> Result<&'a App> {
    apps.iter()
        .find(|a| a.id == needle)
        .or_else(|| apps.iter().find(|a| a.name == needle))
        .ok_or_else(|| Error::NotFound(format!("app {}", needle)))
}
