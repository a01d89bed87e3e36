//! KDL schema definitions for config.kdl and state.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation and key-by-key editing for `appcfg config set/unset`

use chrono::{DateTime, Utc};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::identity::Session;
use crate::storage::BackendType;
use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys accepted in config.kdl, in the order they are written.
pub const CONFIG_KEYS: &[&str] = &[
    "backend",
    "store-url",
    "repo-owner",
    "repo-name",
    "repo-branch",
    "repo-dir",
    "github-api-url",
    "output-format",
    "action-log",
];

/// User preferences stored in config.kdl.
///
/// Safe to sync across machines. File permissions: 0644 (rw-r--r--)
///
/// # KDL Schema
///
/// ```kdl
/// backend "hosted"
/// store-url "https://project.supabase.co"
/// repo-owner "SahajDigitalSync"
/// repo-name "AppConfigs"
/// repo-branch "main"
/// output-format "human"
/// action-log #true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store and identity backend
    pub backend: Option<BackendType>,
    /// Base URL of the hosted store and auth API
    pub store_url: Option<String>,
    /// Owner of the config repository
    pub repo_owner: Option<String>,
    /// Name of the config repository
    pub repo_name: Option<String>,
    /// Branch config files are read from and committed to
    pub repo_branch: Option<String>,
    /// Local directory used instead of the GitHub repository
    pub repo_dir: Option<String>,
    /// GitHub API base URL (for GitHub Enterprise or tests)
    pub github_api_url: Option<String>,
    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,
    /// Whether commands are appended to action.log
    pub action_log: Option<bool>,
}

fn first_string(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)?
        .entries()
        .first()?
        .value()
        .as_string()
        .map(str::to_string)
}

fn first_bool(doc: &KdlDocument, name: &str) -> Option<bool> {
    doc.get(name)?.entries().first()?.value().as_bool()
}

fn string_node(name: &str, value: &str) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    node
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<()> {
        if self.backend == Some(BackendType::Hosted) && self.store_url.is_none() {
            return Err(Error::Config(
                "backend \"hosted\" requires store-url".to_string(),
            ));
        }
        for url in [&self.store_url, &self.github_api_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!("'{}' is not an http(s) URL", url)));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown or malformed nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            backend: first_string(doc, "backend").and_then(|s| BackendType::parse(&s)),
            store_url: first_string(doc, "store-url"),
            repo_owner: first_string(doc, "repo-owner"),
            repo_name: first_string(doc, "repo-name"),
            repo_branch: first_string(doc, "repo-branch"),
            repo_dir: first_string(doc, "repo-dir"),
            github_api_url: first_string(doc, "github-api-url"),
            output_format: first_string(doc, "output-format")
                .and_then(|s| OutputFormat::parse(&s)),
            action_log: first_bool(doc, "action-log"),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        for key in CONFIG_KEYS {
            if *key == "action-log" {
                if let Some(enabled) = self.action_log {
                    let mut node = KdlNode::new("action-log");
                    node.push(KdlEntry::new(KdlValue::Bool(enabled)));
                    doc.nodes_mut().push(node);
                }
            } else if let Some(value) = self.get(key) {
                doc.nodes_mut().push(string_node(key, &value));
            }
        }
        doc
    }

    /// Current value of `key` as text, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "backend" => self.backend.map(|b| b.as_str().to_string()),
            "store-url" => self.store_url.clone(),
            "repo-owner" => self.repo_owner.clone(),
            "repo-name" => self.repo_name.clone(),
            "repo-branch" => self.repo_branch.clone(),
            "repo-dir" => self.repo_dir.clone(),
            "github-api-url" => self.github_api_url.clone(),
            "output-format" => self.output_format.map(|f| f.as_str().to_string()),
            "action-log" => self.action_log.map(|b| b.to_string()),
            _ => None,
        }
    }

    /// Set `key` from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "backend" => {
                self.backend = Some(BackendType::parse(value).ok_or_else(|| {
                    Error::Config(format!(
                        "backend must be \"local\" or \"hosted\", got '{}'",
                        value
                    ))
                })?)
            }
            "store-url" => {
                self.store_url = non_blank(value).map(|u| u.trim_end_matches('/').to_string())
            }
            "repo-owner" => self.repo_owner = non_blank(value),
            "repo-name" => self.repo_name = non_blank(value),
            "repo-branch" => self.repo_branch = non_blank(value),
            "repo-dir" => self.repo_dir = non_blank(value),
            "github-api-url" => {
                self.github_api_url = non_blank(value).map(|u| u.trim_end_matches('/').to_string())
            }
            "output-format" => {
                self.output_format = Some(OutputFormat::parse(value).ok_or_else(|| {
                    Error::Config(format!(
                        "output-format must be \"json\" or \"human\", got '{}'",
                        value
                    ))
                })?)
            }
            "action-log" => self.action_log = Some(parse_bool(key, value)?),
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// Clear `key`. Returns whether it was set.
    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let was_set = match key {
            "backend" => self.backend.take().is_some(),
            "store-url" => self.store_url.take().is_some(),
            "repo-owner" => self.repo_owner.take().is_some(),
            "repo-name" => self.repo_name.take().is_some(),
            "repo-branch" => self.repo_branch.take().is_some(),
            "repo-dir" => self.repo_dir.take().is_some(),
            "github-api-url" => self.github_api_url.take().is_some(),
            "output-format" => self.output_format.take().is_some(),
            "action-log" => self.action_log.take().is_some(),
            _ => return Err(unknown_key(key)),
        };
        Ok(was_set)
    }
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "unknown config key '{}' (expected one of: {})",
        key,
        CONFIG_KEYS.join(", ")
    ))
}

/// Runtime state stored in state.kdl.
///
/// Contains secrets and the current session.
/// **MUST be written with 0600 permissions (owner read/write only)**.
///
/// # KDL Schema
///
/// ```kdl
/// github-token "ghp_xxxxxxxxxxxxxxxxxxxx"
/// store-key "eyJhbGciOi..."
/// session {
///     user-id "8d6f..."
///     email "dev@example.com"
///     access-token "..."
///     refresh-token "..."
///     expires-at "2026-10-19T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// GitHub token for the contents API (sensitive!)
    pub github_token: Option<String>,
    /// API key of the hosted store (sensitive!)
    pub store_key: Option<String>,
    /// The signed-in session, if any
    pub session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_secrets(&self) -> bool {
        self.github_token.is_some() || self.store_key.is_some() || self.session.is_some()
    }

    /// The GitHub token with all but its first and last four characters hidden.
    pub fn masked_token(&self) -> Option<String> {
        self.github_token.as_deref().map(mask_secret)
    }

    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            github_token: first_string(doc, "github-token"),
            store_key: first_string(doc, "store-key"),
            session: doc
                .get("session")
                .and_then(|node| node.children())
                .and_then(session_from_kdl),
        }
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref token) = self.github_token {
            doc.nodes_mut().push(string_node("github-token", token));
        }
        if let Some(ref key) = self.store_key {
            doc.nodes_mut().push(string_node("store-key", key));
        }
        if let Some(ref session) = self.session {
            let mut node = KdlNode::new("session");
            node.set_children(session_to_kdl(session));
            doc.nodes_mut().push(node);
        }

        doc
    }
}

/// Mask a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        // Too short to mask meaningfully
        format!("{}...", chars.iter().take(4).collect::<String>())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

fn session_from_kdl(doc: &KdlDocument) -> Option<Session> {
    Some(Session {
        user_id: first_string(doc, "user-id")?,
        email: first_string(doc, "email").unwrap_or_default(),
        access_token: first_string(doc, "access-token")?,
        refresh_token: first_string(doc, "refresh-token"),
        expires_at: first_string(doc, "expires-at")
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    })
}

fn session_to_kdl(session: &Session) -> KdlDocument {
    let mut doc = KdlDocument::new();
    let nodes = doc.nodes_mut();
    nodes.push(string_node("user-id", &session.user_id));
    nodes.push(string_node("email", &session.email));
    nodes.push(string_node("access-token", &session.access_token));
    if let Some(ref refresh) = session.refresh_token {
        nodes.push(string_node("refresh-token", refresh));
    }
    if let Some(expires_at) = session.expires_at {
        nodes.push(string_node("expires-at", &expires_at.to_rfc3339()));
    }
    doc
}

/// Required permissions for state.kdl (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;
