//! `appcfg system init`: set up the local data directory and database.

use serde::Serialize;
use std::path::PathBuf;
use std::rc::Rc;

use super::{Environment, Output, json_string};
use crate::identity::LocalIdentity;
use crate::models::{Role, User};
use crate::storage::{BackendType, SqliteStore};
use crate::{Error, Result};

#[derive(Debug, Serialize)]
pub struct SystemInit {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub created_database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<User>,
}

impl Output for SystemInit {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![if self.created_database {
            format!("Created database at {}", self.database.display())
        } else {
            format!("Database already exists at {}", self.database.display())
        }];
        if let Some(ref admin) = self.admin {
            lines.push(format!("Created admin {} ({})", admin.email, admin.id));
        }
        if self.created_database && self.admin.is_none() {
            lines.push(
                "No admin yet: run `appcfg system init --admin-email E --admin-password P`"
                    .to_string(),
            );
        }
        lines.join("\n")
    }
}

/// Create the local database, and optionally its first admin.
///
/// Running it again is harmless: the schema is created only where missing.
pub fn system_init(env: &Environment, admin: Option<(&str, &str)>) -> Result<SystemInit> {
    if env.backend() != BackendType::Local {
        return Err(Error::Validation(
            "system init only applies to the local backend; the hosted store is provisioned \
             by its operators"
                .to_string(),
        ));
    }

    let database = env.paths.database_file();
    let created_database = !SqliteStore::exists(&database);
    let store = Rc::new(SqliteStore::open(&database)?);
    tracing::info!(path = %database.display(), created = created_database, "database ready");

    let admin = match admin {
        Some((email, password)) => {
            let identity = LocalIdentity::new(store, env.paths.state_file());
            Some(identity.register(email, password, Role::Admin)?)
        }
        None => None,
    };

    Ok(SystemInit {
        data_dir: env.paths.data_dir.clone(),
        database,
        created_database,
        admin,
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

    #[test]
    fn test_init_creates_database_and_admin() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);

        let first = system_init(&env, Some(("Admin@Example.com", "secret-pw"))).unwrap();
        assert!(first.created_database);
        assert!(first.database.is_file());
        let admin = first.admin.unwrap();
        assert_eq!(admin.email, "admin@example.com");
        assert_eq!(admin.role, Role::Admin);

        let again = system_init(&env, None).unwrap();
        assert!(!again.created_database);
        assert!(again.to_human().contains("already exists"));
    }

    #[test]
    fn test_init_rejects_duplicate_admin() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(&dir);
        system_init(&env, Some(("admin@example.com", "secret-pw"))).unwrap();

        let err = system_init(&env, Some(("admin@example.com", "other-pw"))).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_init_rejects_hosted_backend() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("config"), dir.path().join("data"));
        let mut config = crate::config::AppConfig::new();
        config.set("backend", "hosted").unwrap();
        config.set("store-url", "https://example.supabase.co").unwrap();
        crate::config::save_config(&paths.config_file(), &config).unwrap();
        let env = Environment::from_paths(paths, &Overrides::new()).unwrap();

        assert!(matches!(system_init(&env, None), Err(Error::Validation(_))));
    }
}
