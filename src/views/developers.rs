//! Developers: per-app access grants for every developer (admin only).

use serde::Serialize;
use serde_json::json;
use std::rc::Rc;

use super::{LocalList, Pending, ViewScope};
use crate::models::{App, NewPermission, Permission, Role, User};
use crate::shell::Viewer;
use crate::storage::{Direction, Query, RecordStore, RecordStoreExt};
use crate::{Error, Result};

/// One cell of the grant matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppAccess {
    pub app_id: String,
    pub app_name: String,
    pub granted: bool,
}

/// One developer and their access to every app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperRow {
    pub user: User,
    pub apps: Vec<AppAccess>,
}

pub struct DevelopersView {
    store: Rc<dyn RecordStore>,
    viewer: Viewer,
    scope: ViewScope,
    users: LocalList<User>,
    apps: LocalList<App>,
    permissions: LocalList<Permission>,
}

impl DevelopersView {
    /// Open the view. Only admins may.
    pub fn new(store: Rc<dyn RecordStore>, viewer: Viewer) -> Result<Self> {
        viewer.require_admin("managing developers")?;
        Ok(Self {
            store,
            viewer,
            scope: ViewScope::new(),
            users: LocalList::default(),
            apps: LocalList::default(),
            permissions: LocalList::default(),
        })
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    /// All users, newest first.
    pub fn users(&self) -> &[User] {
        self.users.items()
    }

    /// All apps, by name.
    pub fn apps(&self) -> &[App] {
        self.apps.items()
    }

    pub fn permissions(&self) -> &[Permission] {
        self.permissions.items()
    }

    /// Load users, apps, and grants. Returns `false` when the result arrived stale.
    pub fn load(&mut self) -> Result<bool> {
        let ticket = self.scope.begin();

        let users = self
            .store
            .select_records::<User>(&Query::new().order_by("created_at", Direction::Descending))?;
        let apps = self
            .store
            .select_records::<App>(&Query::new().order_by("name", Direction::Ascending))?;
        let permissions = self.store.select_records::<Permission>(&Query::new())?;

        let Some((users, apps, permissions)) = ticket.accept((users, apps, permissions)) else {
            return Ok(false);
        };
        tracing::debug!(
            users = users.len(),
            apps = apps.len(),
            permissions = permissions.len(),
            "developers loaded"
        );
        self.users.replace_all(users);
        self.apps.replace_all(apps);
        self.permissions.replace_all(permissions);
        Ok(true)
    }

    pub fn has_access(&self, user_id: &str, app_id: &str) -> bool {
        self.permissions.find(|p| p.covers(user_id, app_id)).is_some()
    }

    /// Users whose role is not admin.
    pub fn developers(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| !u.role.is_admin())
    }

    /// The grant matrix: one row per developer, one cell per app.
    pub fn matrix(&self) -> Vec<DeveloperRow> {
        self.developers()
            .map(|user| DeveloperRow {
                user: user.clone(),
                apps: self
                    .apps
                    .iter()
                    .map(|app| AppAccess {
                        app_id: app.id.clone(),
                        app_name: app.name.clone(),
                        granted: self.has_access(&user.id, &app.id),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Flip a developer's access to an app. Returns the new state.
    ///
    /// The local grant set changes first; if the store refuses, the change is
    /// rolled back and the error returned.
    pub fn toggle(&mut self, user_id: &str, app_id: &str) -> Result<bool> {
        if self.has_access(user_id, app_id) {
            self.revoke(user_id, app_id)?;
            Ok(false)
        } else {
            self.grant(user_id, app_id)?;
            Ok(true)
        }
    }

    /// Give a developer access to an app. Granting twice is a no-op.
    pub fn grant(&mut self, user_id: &str, app_id: &str) -> Result<Permission> {
        if let Some(existing) = self.permissions.find(|p| p.covers(user_id, app_id)) {
            return Ok(existing.clone());
        }

        let store = Rc::clone(&self.store);
        let placeholder = Permission {
            id: String::new(),
            user_id: user_id.to_string(),
            app_id: app_id.to_string(),
        };
        let pending = self.permissions.append(placeholder);

        let inserted = store.insert_record::<Permission, _>(&NewPermission {
            user_id: user_id.to_string(),
            app_id: app_id.to_string(),
        });
        let stored = match inserted {
            Ok(permission) => permission,
            Err(Error::AlreadyExists(_)) => {
                // Granted elsewhere since the last load; adopt that row.
                let existing = store.select_records::<Permission>(
                    &Query::new().eq("user_id", user_id).eq("app_id", app_id),
                );
                match existing.map(|rows| rows.into_iter().next()) {
                    Ok(Some(permission)) => permission,
                    Ok(None) => {
                        pending.rollback();
                        return Err(Error::Other(format!(
                            "grant of {} to {} vanished while being applied",
                            app_id, user_id
                        )));
                    }
                    Err(e) => {
                        pending.rollback();
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(user_id, app_id, error = %e, "grant failed; rolling back");
                pending.rollback();
                return Err(e);
            }
        };

        pending.confirm(Some(stored.clone()));
        tracing::info!(user_id, app_id, "granted app access");
        Ok(stored)
    }

    /// Take a developer's access to an app away. Returns whether a grant was removed.
    pub fn revoke(&mut self, user_id: &str, app_id: &str) -> Result<bool> {
        let store = Rc::clone(&self.store);
        let Some(pending) = self.permissions.remove_where(|p| p.covers(user_id, app_id)) else {
            return Ok(false);
        };
        let Some(id) = pending_permission_id(&pending) else {
            pending.rollback();
            return Ok(false);
        };

        match store.delete_record::<Permission>(&id) {
            Ok(()) => {
                pending.confirm(None);
                tracing::info!(user_id, app_id, "revoked app access");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(user_id, app_id, error = %e, "revoke failed; rolling back");
                pending.rollback();
                Err(e)
            }
        }
    }

    /// Change a user's role.
    pub fn set_role(&mut self, user_id: &str, role: Role) -> Result<User> {
        self.viewer.require_admin("changing roles")?;
        if user_id == self.viewer.user_id() && !role.is_admin() {
            return Err(Error::Validation(
                "admins cannot remove their own admin role".to_string(),
            ));
        }

        let user: User = self
            .store
            .update_record(user_id, &json!({ "role": role }))?;
        self.users.replace_where(|u| u.id == user_id, user.clone());
        tracing::info!(user_id, role = %role, "changed role");
        Ok(user)
    }
}

/// Id of the grant being removed by `pending`.
fn pending_permission_id(pending: &Pending<'_, Permission>) -> Option<String> {
    pending.removed().map(|p| p.id.clone()).filter(|id| !id.is_empty())
}
