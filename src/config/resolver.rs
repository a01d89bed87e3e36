//! Unified precedence resolution for configuration and state.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. `APPCFG_*` environment variables
//! 3. config.kdl (preferences) / state.kdl (secrets)
//! 4. Built-in defaults
//!
//! Every resolved value remembers where it came from so `appcfg config show`
//! can explain it.

use std::path::PathBuf;

use crate::config::schema::{AppConfig, AppState, OutputFormat};
use crate::storage::BackendType;
use crate::{Error, Result};

pub const CONFIG_DIR_ENV: &str = "APPCFG_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "APPCFG_DATA_DIR";
pub const BACKEND_ENV: &str = "APPCFG_BACKEND";
pub const STORE_URL_ENV: &str = "APPCFG_STORE_URL";
pub const STORE_KEY_ENV: &str = "APPCFG_STORE_KEY";
pub const GITHUB_TOKEN_ENV: &str = "APPCFG_GITHUB_TOKEN";
pub const REPO_OWNER_ENV: &str = "APPCFG_REPO_OWNER";
pub const REPO_NAME_ENV: &str = "APPCFG_REPO_NAME";
pub const REPO_BRANCH_ENV: &str = "APPCFG_REPO_BRANCH";
pub const REPO_DIR_ENV: &str = "APPCFG_REPO_DIR";
pub const GITHUB_API_URL_ENV: &str = "APPCFG_GITHUB_API_URL";

pub const DEFAULT_REPO_OWNER: &str = "SahajDigitalSync";
pub const DEFAULT_REPO_NAME: &str = "AppConfigs";
pub const DEFAULT_REPO_BRANCH: &str = "main";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const APP_DIR_NAME: &str = "appconfigs";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl or state.kdl
    File,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Locations of the config and data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Paths {
    pub fn new(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Resolve directories from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve directories, consulting `lookup` for the `APPCFG_*_DIR` overrides.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_dir = match non_blank(lookup(CONFIG_DIR_ENV)) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .ok_or_else(|| {
                    Error::Config(format!(
                        "cannot determine config directory; set {}",
                        CONFIG_DIR_ENV
                    ))
                })?,
        };
        let data_dir = match non_blank(lookup(DATA_DIR_ENV)) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .ok_or_else(|| {
                    Error::Config(format!(
                        "cannot determine data directory; set {}",
                        DATA_DIR_ENV
                    ))
                })?,
        };
        Ok(Self::new(config_dir, data_dir))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.kdl")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.kdl")
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("appconfigs.db")
    }

    pub fn action_log_file(&self) -> PathBuf {
        self.data_dir.join("action.log")
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_format: Option<OutputFormat>,
    pub backend: Option<BackendType>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Resolved<BackendType>,
    pub store_url: Option<Resolved<String>>,
    pub store_key: Option<Resolved<String>>,
    pub github_token: Option<Resolved<String>>,
    pub repo_owner: Resolved<String>,
    pub repo_name: Resolved<String>,
    pub repo_branch: Resolved<String>,
    pub repo_dir: Option<Resolved<PathBuf>>,
    pub github_api_url: Resolved<String>,
    pub output_format: Resolved<OutputFormat>,
    pub action_log: Resolved<bool>,
}

impl Settings {
    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_ref().map(|r| r.value.as_str())
    }

    pub fn store_key(&self) -> Option<&str> {
        self.store_key.as_ref().map(|r| r.value.as_str())
    }

    pub fn store_url(&self) -> Option<&str> {
        self.store_url.as_ref().map(|r| r.value.as_str())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve an optional string from env, then file.
fn layered(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
    file: &Option<String>,
) -> Option<Resolved<String>> {
    if let Some(value) = non_blank(env(name)) {
        return Some(Resolved::new(value, ValueSource::EnvVar(name.to_string())));
    }
    file.clone()
        .map(|value| Resolved::new(value, ValueSource::File))
}

/// Resolve a string from env, then file, then a built-in default.
fn layered_or(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
    file: &Option<String>,
    default: &str,
) -> Resolved<String> {
    layered(env, name, file)
        .unwrap_or_else(|| Resolved::new(default.to_string(), ValueSource::Default))
}

/// Resolve settings using the process environment.
pub fn resolve_settings(
    config: &AppConfig,
    state: &AppState,
    overrides: &Overrides,
) -> Result<Settings> {
    resolve_settings_with_env(config, state, overrides, &|name| std::env::var(name).ok())
}

/// Resolve settings from already-loaded files, consulting `env` for variables.
pub fn resolve_settings_with_env(
    config: &AppConfig,
    state: &AppState,
    overrides: &Overrides,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let backend = if let Some(backend) = overrides.backend {
        Resolved::new(backend, ValueSource::CliFlag)
    } else if let Some(raw) = non_blank(env(BACKEND_ENV)) {
        let backend = BackendType::parse(&raw).ok_or_else(|| {
            Error::Config(format!("{}: unknown backend '{}'", BACKEND_ENV, raw))
        })?;
        Resolved::new(backend, ValueSource::EnvVar(BACKEND_ENV.to_string()))
    } else if let Some(backend) = config.backend {
        Resolved::new(backend, ValueSource::File)
    } else {
        Resolved::new(BackendType::default(), ValueSource::Default)
    };

    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = config.output_format {
        Resolved::new(format, ValueSource::File)
    } else {
        Resolved::new(OutputFormat::default(), ValueSource::Default)
    };

    let action_log = match config.action_log {
        Some(enabled) => Resolved::new(enabled, ValueSource::File),
        None => Resolved::new(true, ValueSource::Default),
    };

    let settings = Settings {
        backend,
        store_url: layered(env, STORE_URL_ENV, &config.store_url).map(|mut r| {
            r.value = r.value.trim_end_matches('/').to_string();
            r
        }),
        store_key: layered(env, STORE_KEY_ENV, &state.store_key),
        github_token: layered(env, GITHUB_TOKEN_ENV, &state.github_token),
        repo_owner: layered_or(env, REPO_OWNER_ENV, &config.repo_owner, DEFAULT_REPO_OWNER),
        repo_name: layered_or(env, REPO_NAME_ENV, &config.repo_name, DEFAULT_REPO_NAME),
        repo_branch: layered_or(env, REPO_BRANCH_ENV, &config.repo_branch, DEFAULT_REPO_BRANCH),
        repo_dir: layered(env, REPO_DIR_ENV, &config.repo_dir)
            .map(|r| Resolved::new(PathBuf::from(r.value), r.source)),
        github_api_url: layered_or(
            env,
            GITHUB_API_URL_ENV,
            &config.github_api_url,
            DEFAULT_GITHUB_API_URL,
        ),
        output_format,
        action_log,
    };

    if settings.backend.value == BackendType::Hosted && settings.store_url.is_none() {
        return Err(Error::Config(format!(
            "the hosted backend needs a store URL (config key store-url or {})",
            STORE_URL_ENV
        )));
    }

    Ok(settings)
}
