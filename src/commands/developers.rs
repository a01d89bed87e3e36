//! `appcfg dev ...`: developer access management (admin only).

use serde::Serialize;

use super::{Context, Output, find_app, find_user, json_string};
use crate::models::{Role, User};
use crate::shell::Route;
use crate::views::{DeveloperRow, DevelopersView};
use crate::{Error, Result};

fn open_view(ctx: &Context) -> Result<DevelopersView> {
    let viewer = ctx.require(&Route::Developers)?;
    let mut view = DevelopersView::new(ctx.store(), viewer)?;
    view.load()?;
    Ok(view)
}

/// Resolve user and app arguments (ids, email, or app name) against a loaded view.
fn resolve(view: &DevelopersView, user: &str, app: &str) -> Result<(String, String)> {
    let user = find_user(view.users(), user)?;
    if user.role.is_admin() {
        return Err(Error::Validation(format!(
            "{} is an admin and already has access to every app",
            user.email
        )));
    }
    let app = find_app(view.apps(), app)?;
    Ok((user.id.clone(), app.id.clone()))
}

#[derive(Serialize)]
pub struct DeveloperMatrix {
    pub developers: Vec<DeveloperRow>,
}

impl Output for DeveloperMatrix {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.developers.is_empty() {
            return "No developers".to_string();
        }
        let mut lines = Vec::new();
        for row in &self.developers {
            lines.push(format!("{} [{}]", row.user.email, row.user.id));
            if row.apps.is_empty() {
                lines.push("  (no apps)".to_string());
            }
            for access in &row.apps {
                lines.push(format!(
                    "  [{}] {} {}",
                    if access.granted { "x" } else { " " },
                    access.app_name,
                    access.app_id
                ));
            }
        }
        lines.join("\n")
    }
}

pub fn dev_list(ctx: &Context) -> Result<DeveloperMatrix> {
    let view = open_view(ctx)?;
    Ok(DeveloperMatrix {
        developers: view.matrix(),
    })
}

#[derive(Serialize)]
pub struct AccessChanged {
    pub user_id: String,
    pub app_id: String,
    pub granted: bool,
    /// Whether the stored grants changed
    pub changed: bool,
}

impl Output for AccessChanged {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let state = if self.granted { "granted" } else { "revoked" };
        if self.changed {
            format!("Access to app {} {} for user {}", self.app_id, state, self.user_id)
        } else {
            format!(
                "Access to app {} already {} for user {}",
                self.app_id, state, self.user_id
            )
        }
    }
}

pub fn dev_toggle(ctx: &Context, user: &str, app: &str) -> Result<AccessChanged> {
    let mut view = open_view(ctx)?;
    let (user_id, app_id) = resolve(&view, user, app)?;
    let granted = view.toggle(&user_id, &app_id)?;
    Ok(AccessChanged {
        user_id,
        app_id,
        granted,
        changed: true,
    })
}

pub fn dev_grant(ctx: &Context, user: &str, app: &str) -> Result<AccessChanged> {
    let mut view = open_view(ctx)?;
    let (user_id, app_id) = resolve(&view, user, app)?;
    let changed = !view.has_access(&user_id, &app_id);
    view.grant(&user_id, &app_id)?;
    Ok(AccessChanged {
        user_id,
        app_id,
        granted: true,
        changed,
    })
}

pub fn dev_revoke(ctx: &Context, user: &str, app: &str) -> Result<AccessChanged> {
    let mut view = open_view(ctx)?;
    let (user_id, app_id) = resolve(&view, user, app)?;
    let changed = view.revoke(&user_id, &app_id)?;
    Ok(AccessChanged {
        user_id,
        app_id,
        granted: false,
        changed,
    })
}

#[derive(Serialize)]
pub struct UserResult {
    #[serde(flatten)]
    pub user: User,
}

impl Output for UserResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("{} [{}] is {}", self.user.email, self.user.id, self.user.role)
    }
}

pub fn dev_role(ctx: &Context, user: &str, role: &str) -> Result<UserResult> {
    let role = Role::parse(role).ok_or_else(|| {
        Error::Validation(format!(
            "role must be \"admin\" or \"developer\", got '{}'",
            role
        ))
    })?;
    let mut view = open_view(ctx)?;
    let user_id = find_user(view.users(), user)?.id.clone();
    let user = view.set_role(&user_id, role)?;
    Ok(UserResult { user })
}

/// Create an account with a password (local backend only).
pub fn dev_add(ctx: &Context, email: &str, password: &str, role: &str) -> Result<UserResult> {
    let role = Role::parse(role).ok_or_else(|| {
        Error::Validation(format!(
            "role must be \"admin\" or \"developer\", got '{}'",
            role
        ))
    })?;
    let viewer = ctx.require(&Route::Developers)?;
    viewer.require_admin("adding users")?;
    let user = ctx
        .local_identity("adding users")?
        .register(email, password, role)?;
    Ok(UserResult { user })
}
