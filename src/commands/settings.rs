//! `appcfg config ...`: show and edit config.kdl and state.kdl.

use serde::Serialize;
use std::path::PathBuf;

use super::{Environment, Output, json_string};
use crate::config::schema::mask_secret;
use crate::config::{Resolved, save_config, save_state};
use crate::{Error, Result};

/// Keys stored in state.kdl rather than config.kdl.
const SECRET_KEYS: &[&str] = &["github-token", "store-key"];

#[derive(Serialize)]
pub struct SettingRow {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub source: String,
}

impl SettingRow {
    fn resolved<T: ToString>(key: &str, resolved: &Resolved<T>) -> Self {
        Self {
            key: key.to_string(),
            value: Some(resolved.value.to_string()),
            source: resolved.source.to_string(),
        }
    }

    fn optional<T: ToString>(key: &str, resolved: Option<&Resolved<T>>) -> Self {
        match resolved {
            Some(resolved) => Self::resolved(key, resolved),
            None => Self::unset(key),
        }
    }

    fn secret(key: &str, resolved: Option<&Resolved<String>>) -> Self {
        match resolved {
            Some(resolved) => Self {
                key: key.to_string(),
                value: Some(mask_secret(&resolved.value)),
                source: resolved.source.to_string(),
            },
            None => Self::unset(key),
        }
    }

    fn unset(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            source: "unset".to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ConfigShow {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub settings: Vec<SettingRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_in_as: Option<String>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let width = self.settings.iter().map(|r| r.key.len()).max().unwrap_or(0);
        let mut lines = vec![
            format!("Config: {}", self.config_file.display()),
            format!("State:  {}", self.state_file.display()),
            String::new(),
        ];
        for row in &self.settings {
            lines.push(format!(
                "{:width$}  {}  ({})",
                row.key,
                row.value.as_deref().unwrap_or("-"),
                row.source,
                width = width
            ));
        }
        if let Some(ref email) = self.signed_in_as {
            lines.push(String::new());
            lines.push(format!("Signed in as {}", email));
        }
        lines.join("\n")
    }
}

/// Effective settings with their sources. Secrets are masked.
pub fn config_show(env: &Environment) -> Result<ConfigShow> {
    let s = &env.settings;
    let repo_dir = s
        .repo_dir
        .as_ref()
        .map(|r| Resolved::new(r.value.display().to_string(), r.source.clone()));

    let settings = vec![
        SettingRow::resolved(
            "backend",
            &Resolved::new(s.backend.value.as_str(), s.backend.source.clone()),
        ),
        SettingRow::optional("store-url", s.store_url.as_ref()),
        SettingRow::secret("store-key", s.store_key.as_ref()),
        SettingRow::secret("github-token", s.github_token.as_ref()),
        SettingRow::resolved("repo-owner", &s.repo_owner),
        SettingRow::resolved("repo-name", &s.repo_name),
        SettingRow::resolved("repo-branch", &s.repo_branch),
        SettingRow::optional("repo-dir", repo_dir.as_ref()),
        SettingRow::resolved("github-api-url", &s.github_api_url),
        SettingRow::resolved(
            "output-format",
            &Resolved::new(s.output_format.value.as_str(), s.output_format.source.clone()),
        ),
        SettingRow::resolved("action-log", &s.action_log),
    ];

    Ok(ConfigShow {
        config_file: env.paths.config_file(),
        state_file: env.paths.state_file(),
        settings,
        signed_in_as: env.state.session.as_ref().map(|s| s.email.clone()),
    })
}

#[derive(Serialize)]
pub struct ConfigChange {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub file: PathBuf,
    pub changed: bool,
}

impl Output for ConfigChange {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match (&self.value, self.changed) {
            (Some(value), _) => format!("{} = {} ({})", self.key, value, self.file.display()),
            (None, true) => format!("Unset {} ({})", self.key, self.file.display()),
            (None, false) => format!("{} was not set", self.key),
        }
    }
}

/// Write one key. Secrets go to state.kdl, everything else to config.kdl.
pub fn config_set(env: &Environment, key: &str, value: &str) -> Result<ConfigChange> {
    if SECRET_KEYS.contains(&key) {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Config(format!("{} cannot be blank", key)));
        }
        let mut state = env.state.clone();
        match key {
            "github-token" => state.github_token = Some(value.to_string()),
            _ => state.store_key = Some(value.to_string()),
        }
        let file = env.paths.state_file();
        save_state(&file, &state)?;
        tracing::info!(key, "stored secret");
        return Ok(ConfigChange {
            key: key.to_string(),
            value: Some(mask_secret(value)),
            file,
            changed: true,
        });
    }

    let mut config = env.config.clone();
    config.set(key, value)?;
    let file = env.paths.config_file();
    save_config(&file, &config)?;
    tracing::info!(key, "updated config");
    Ok(ConfigChange {
        key: key.to_string(),
        value: config.get(key),
        file,
        changed: true,
    })
}

/// Remove one key from whichever file holds it.
pub fn config_unset(env: &Environment, key: &str) -> Result<ConfigChange> {
    if SECRET_KEYS.contains(&key) {
        let mut state = env.state.clone();
        let removed = match key {
            "github-token" => state.github_token.take(),
            _ => state.store_key.take(),
        };
        let file = env.paths.state_file();
        if removed.is_some() {
            save_state(&file, &state)?;
        }
        return Ok(ConfigChange {
            key: key.to_string(),
            value: None,
            file,
            changed: removed.is_some(),
        });
    }

    let mut config = env.config.clone();
    let changed = config.unset(key)?;
    let file = env.paths.config_file();
    if changed {
        save_config(&file, &config)?;
    }
    Ok(ConfigChange {
        key: key.to_string(),
        value: None,
        file,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Paths};

    fn environment(dir: &tempfile::TempDir) -> Environment {
        let paths = Paths::new(dir.path().join("config"), dir.path().join("data"));
        Environment::from_paths(paths, &Overrides::new()).unwrap()
    }

    fn row<'a>(show: &'a ConfigShow, key: &str) -> &'a SettingRow {
        show.settings.iter().find(|r| r.key == key).unwrap()
    }

    #[test]
    fn test_show_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let show = config_show(&environment(&dir)).unwrap();

        let owner = row(&show, "repo-owner");
        assert_eq!(owner.value.as_deref(), Some("SahajDigitalSync"));
        assert_eq!(owner.source, "default");
        assert!(row(&show, "repo-dir").value.is_none());
        assert!(show.to_human().contains("repo-branch"));
    }

    #[test]
    fn test_set_routes_secrets_to_state() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);

        let change = config_set(&env, "github-token", "ghp_abcdefghijklmnop1234").unwrap();
        assert_eq!(change.file, env.paths.state_file());
        assert_ne!(change.value.as_deref(), Some("ghp_abcdefghijklmnop1234"));

        let env = env.reload().unwrap();
        config_set(&env, "repo-branch", "staging").unwrap();

        let env = env.reload().unwrap();
        assert_eq!(env.state.github_token.as_deref(), Some("ghp_abcdefghijklmnop1234"));
        assert_eq!(env.config.repo_branch.as_deref(), Some("staging"));

        let show = config_show(&env).unwrap();
        let token = row(&show, "github-token");
        assert_eq!(token.source, "file");
        assert!(!token.value.as_deref().unwrap().contains("abcdefghijklmnop"));
        assert!(!show.to_json().contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_unset() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);
        config_set(&env, "repo-owner", "someone").unwrap();

        let env = env.reload().unwrap();
        assert!(config_unset(&env, "repo-owner").unwrap().changed);
        let env = env.reload().unwrap();
        assert!(!config_unset(&env, "repo-owner").unwrap().changed);
        assert!(!config_unset(&env, "store-key").unwrap().changed);
        assert!(matches!(
            config_unset(&env, "colour"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_set_validates() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);
        assert!(config_set(&env, "output-format", "yaml").is_err());
        assert!(config_set(&env, "store-key", "  ").is_err());
        assert!(matches!(
            config_set(&env, "store-url", "ftp://nope"),
            Err(Error::Config(_))
        ));
    }
}
