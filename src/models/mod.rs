//! Data models for appconfigs entities.
//!
//! This module defines the records kept in the record store:
//! - `User` - An account with an admin or developer role
//! - `App` - A mobile application and the config file that drives it
//! - `Control` - A named reference to one key path inside an app's config
//! - `Permission` - A grant of one app to one developer
//!
//! Each record has a matching `New*` payload used for inserts. Payloads
//! validate their required fields locally so that a missing field never
//! reaches the network layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::storage::{Record, Table};
use crate::{Error, Result};

/// Role of a signed-in user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    /// Unprivileged role, also the fallback when role lookup fails
    #[default]
    Developer,
}

impl Role {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "developer" | "dev" => Some(Role::Developer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Developer => "developer",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target platform of an app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    Android,
    #[serde(rename = "iOS")]
    Ios,
}

impl Platform {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "android" => Some(Platform::Android),
            "ios" => Some(Platform::Ios),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "Android",
            Platform::Ios => "iOS",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account known to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    pub email: String,

    #[serde(default)]
    pub role: Role,

    pub created_at: DateTime<Utc>,
}

/// A registered mobile application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub platform: Platform,

    /// Store listing URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,

    /// Path of the JSON config file inside the config repository
    #[serde(default)]
    pub config_filename: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl App {
    /// The config filename, if one is set and non-blank.
    pub fn config_file(&self) -> Option<&str> {
        self.config_filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// A named reference to a key path inside an app's config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    #[serde(deserialize_with = "id_string")]
    pub app_id: String,

    pub name: String,

    /// Dot-delimited key path, e.g. `ads.main_banner`
    pub key_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A grant of one app to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    #[serde(deserialize_with = "id_string")]
    pub user_id: String,

    #[serde(deserialize_with = "id_string")]
    pub app_id: String,
}

impl Permission {
    /// Whether this grant covers the given user and app.
    pub fn covers(&self, user_id: &str, app_id: &str) -> bool {
        self.user_id == user_id && self.app_id == app_id
    }
}

impl Record for User {
    const TABLE: Table = Table::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for App {
    const TABLE: Table = Table::Apps;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Control {
    const TABLE: Table = Table::AppControls;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Permission {
    const TABLE: Table = Table::AppPermissions;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Insert payload for `users`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
}

impl NewUser {
    pub fn validate(&mut self) -> Result<()> {
        self.email = required("email", &self.email)?.to_lowercase();
        if !self.email.contains('@') {
            return Err(Error::Validation(format!(
                "email must be an address, got '{}'",
                self.email
            )));
        }
        Ok(())
    }
}

/// Insert payload for `apps`.
#[derive(Debug, Clone, Serialize)]
pub struct NewApp {
    pub name: String,
    pub platform: Platform,
    pub app_url: Option<String>,
    pub config_filename: String,
}

impl NewApp {
    /// Validate and normalize the form fields.
    ///
    /// Name and config filename are required; a blank URL becomes `None`.
    pub fn validate(&mut self) -> Result<()> {
        self.name = required("name", &self.name)?;
        self.config_filename = required("config filename", &self.config_filename)?;
        crate::config_repo::validate_filename(&self.config_filename)?;
        self.app_url = optional(self.app_url.take());
        Ok(())
    }
}

/// Insert payload for `app_controls`.
#[derive(Debug, Clone, Serialize)]
pub struct NewControl {
    pub app_id: String,
    pub name: String,
    pub key_name: String,
    pub description: Option<String>,
}

impl NewControl {
    pub fn validate(&mut self) -> Result<()> {
        self.name = required("name", &self.name)?;
        self.key_name = required("key", &self.key_name)?;
        self.description = optional(self.description.take());
        Ok(())
    }
}

/// Insert payload for `app_permissions`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPermission {
    pub user_id: String,
    pub app_id: String,
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accept ids serialized either as strings or as integers.
///
/// Hosted stores commonly use bigint identity columns; the local store uses
/// UUID strings. Both are carried as opaque strings.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("developer"), Some(Role::Developer));
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_platform_serde_names() {
        assert_eq!(serde_json::to_value(Platform::Ios).unwrap(), json!("iOS"));
        assert_eq!(
            serde_json::to_value(Platform::Android).unwrap(),
            json!("Android")
        );
        assert_eq!(Platform::parse("IOS"), Some(Platform::Ios));
    }

    #[test]
    fn test_app_accepts_integer_ids_and_null_filename() {
        let app: App = serde_json::from_value(json!({
            "id": 42,
            "name": "Connect 3D",
            "platform": "iOS",
            "app_url": null,
            "config_filename": null,
            "created_at": "2026-01-31T09:00:00.123456+00:00"
        }))
        .unwrap();

        assert_eq!(app.id, "42");
        assert_eq!(app.platform, Platform::Ios);
        assert!(app.config_file().is_none());
    }

    #[test]
    fn test_config_file_ignores_blank() {
        let app: App = serde_json::from_value(json!({
            "id": "a",
            "name": "x",
            "platform": "Android",
            "config_filename": "   ",
            "created_at": "2026-01-31T09:00:00Z"
        }))
        .unwrap();
        assert!(app.config_file().is_none());
    }

    #[test]
    fn test_new_app_validate_normalizes() {
        let mut new = NewApp {
            name: "  Connect 3D ".to_string(),
            platform: Platform::Android,
            app_url: Some("  ".to_string()),
            config_filename: "connect_3d.json".to_string(),
        };
        new.validate().unwrap();
        assert_eq!(new.name, "Connect 3D");
        assert_eq!(new.app_url, None);
    }

    #[test]
    fn test_new_app_requires_filename() {
        let mut new = NewApp {
            name: "Connect 3D".to_string(),
            platform: Platform::Android,
            app_url: None,
            config_filename: "".to_string(),
        };
        let err = new.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("config filename is required"));
    }

    #[test]
    fn test_new_control_requires_key() {
        let mut new = NewControl {
            app_id: "a".to_string(),
            name: "Main Banner".to_string(),
            key_name: " ".to_string(),
            description: None,
        };
        assert!(matches!(new.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_new_user_requires_address() {
        let mut new = NewUser {
            email: "nobody".to_string(),
            role: Role::Developer,
        };
        assert!(matches!(new.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_permission_covers() {
        let p = Permission {
            id: "p".to_string(),
            user_id: "u".to_string(),
            app_id: "a".to_string(),
        };
        assert!(p.covers("u", "a"));
        assert!(!p.covers("u", "b"));
    }
}
