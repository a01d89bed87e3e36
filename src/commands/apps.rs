//! `appcfg app ...`: the dashboard and app detail pages.

use serde::Serialize;

use super::{Context, Output, json_string};
use crate::config_repo::validate_filename;
use crate::models::{App, NewApp, Platform};
use crate::shell::Route;
use crate::views::{AppDetailView, ConfigStatus, ControlView, DashboardView};
use crate::{Error, Result};

#[derive(Serialize)]
pub struct AppList {
    pub apps: Vec<App>,
}

impl Output for AppList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.apps.is_empty() {
            return "No apps".to_string();
        }
        let mut lines = vec![format!("{} app(s):", self.apps.len())];
        for app in &self.apps {
            lines.push(format!(
                "  [{}] {} ({}) {}",
                app.id,
                app.name,
                app.platform,
                app.config_file().unwrap_or("(no config file)")
            ));
        }
        lines.join("\n")
    }
}

/// Apps visible to the signed-in user, newest first.
pub fn app_list(ctx: &Context) -> Result<AppList> {
    let viewer = ctx.require(&Route::Dashboard)?;
    let mut view = DashboardView::new(ctx.store(), viewer);
    view.load()?;
    Ok(AppList {
        apps: view.apps().to_vec(),
    })
}

#[derive(Serialize)]
pub struct AppAdded {
    #[serde(flatten)]
    pub app: App,
}

impl Output for AppAdded {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Added app {} [{}]", self.app.name, self.app.id)
    }
}

pub fn app_add(
    ctx: &Context,
    name: &str,
    platform: &str,
    config_file: &str,
    url: Option<&str>,
) -> Result<AppAdded> {
    let viewer = ctx.require(&Route::Dashboard)?;
    let platform = Platform::parse(platform).ok_or_else(|| {
        Error::Validation(format!(
            "platform must be \"android\" or \"ios\", got '{}'",
            platform
        ))
    })?;
    validate_filename(config_file.trim())?;

    let mut view = DashboardView::new(ctx.store(), viewer);
    let app = view.add_app(NewApp {
        name: name.to_string(),
        platform,
        app_url: url.map(str::to_string),
        config_filename: config_file.to_string(),
    })?;
    Ok(AppAdded { app })
}

#[derive(Serialize)]
pub struct AppDetail {
    pub app: App,
    pub config: ConfigStatus,
    pub controls: Vec<ControlView>,
}

impl Output for AppDetail {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} [{}] ({})", self.app.name, self.app.id, self.app.platform)];
        if let Some(ref url) = self.app.app_url {
            lines.push(format!("URL: {}", url));
        }
        lines.push(match &self.config {
            ConfigStatus::NotLoaded => "Config: not loaded".to_string(),
            ConfigStatus::Loaded { filename, version } => {
                format!("Config: {} @ {}", filename, version)
            }
            ConfigStatus::Unavailable { reason, .. } => format!("Config unavailable: {}", reason),
        });

        if self.controls.is_empty() {
            lines.push("No controls".to_string());
        } else {
            lines.push(format!("{} control(s):", self.controls.len()));
            for view in &self.controls {
                lines.push(format!(
                    "  [{}] {} ({}) = {}",
                    view.control.id,
                    view.control.name,
                    view.control.key_name,
                    view.live.display()
                ));
                if let Some(ref description) = view.control.description {
                    lines.push(format!("      {}", description));
                }
            }
        }
        lines.join("\n")
    }
}

/// The app detail page: app, config status, and controls with live values.
pub fn app_show(ctx: &Context, app_id: &str) -> Result<AppDetail> {
    let viewer = ctx.require(&Route::AppDetail(app_id.to_string()))?;
    let mut view = AppDetailView::new(ctx.store(), ctx.repository(), viewer, app_id);
    view.load()?;

    let app = view
        .app()
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("app {}", app_id)))?;
    Ok(AppDetail {
        app,
        config: view.config_status().clone(),
        controls: view.controls(),
    })
}

#[derive(Serialize)]
pub struct AppRemoved {
    pub id: String,
}

impl Output for AppRemoved {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Removed app {}", self.id)
    }
}

pub fn app_rm(ctx: &Context, app_id: &str) -> Result<AppRemoved> {
    let viewer = ctx.require(&Route::Dashboard)?;
    let mut view = DashboardView::new(ctx.store(), viewer);
    view.remove_app(app_id)?;
    Ok(AppRemoved {
        id: app_id.to_string(),
    })
}
