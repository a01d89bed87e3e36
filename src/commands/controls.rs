//! `appcfg control ...`: define controls and set their live values.

use serde::Serialize;
use serde_json::Value;

use super::{Context, Output, json_string};
use crate::keypath;
use crate::models::Control;
use crate::shell::Route;
use crate::storage::RecordStoreExt;
use crate::views::AppDetailView;
use crate::views::detail::ValueChange;
use crate::Result;

#[derive(Serialize)]
pub struct ControlAdded {
    #[serde(flatten)]
    pub control: Control,
}

impl Output for ControlAdded {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Added control {} [{}] for key {}",
            self.control.name, self.control.id, self.control.key_name
        )
    }
}

pub fn control_add(
    ctx: &Context,
    app_id: &str,
    name: &str,
    key: &str,
    description: Option<&str>,
) -> Result<ControlAdded> {
    let viewer = ctx.require(&Route::AppDetail(app_id.to_string()))?;
    viewer.require_admin("adding a control")?;

    let mut view = AppDetailView::new(ctx.store(), ctx.repository(), viewer, app_id);
    let control = view.add_control(name, key, description)?;
    Ok(ControlAdded { control })
}

#[derive(Serialize)]
pub struct ControlRemoved {
    pub id: String,
    pub app_id: String,
}

impl Output for ControlRemoved {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Removed control {} from app {}", self.id, self.app_id)
    }
}

pub fn control_rm(ctx: &Context, control_id: &str) -> Result<ControlRemoved> {
    let control: Control = ctx.store().get_record(control_id)?;
    let viewer = ctx.require(&Route::AppDetail(control.app_id.clone()))?;
    viewer.require_admin("removing a control")?;

    let mut view = AppDetailView::new(ctx.store(), ctx.repository(), viewer, &control.app_id);
    view.load_controls()?;
    view.remove_control(control_id)?;
    Ok(ControlRemoved {
        id: control.id,
        app_id: control.app_id,
    })
}

#[derive(Serialize)]
pub struct ControlSet {
    #[serde(flatten)]
    pub change: ValueChange,
}

impl Output for ControlSet {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let change = &self.change;
        let previous = change
            .previous
            .as_ref()
            .map(keypath::render)
            .unwrap_or_else(|| "(unset)".to_string());
        let mut out = format!(
            "Set {} = {} (was {})\n{}",
            change.key_name,
            keypath::render(&change.value),
            previous,
            change.commit.message
        );
        if let Some(ref sha) = change.commit.commit_sha {
            out.push_str(&format!("\nCommit: {}", sha));
        }
        if let Some(ref url) = change.commit.url {
            out.push_str(&format!("\n{}", url));
        }
        out
    }
}

/// Parse a value typed on the command line.
///
/// Valid JSON is taken as is (`true`, `3`, `"x"`, `{"a": 1}`); anything else
/// is stored as a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Write a control's value into its app's config document and commit it.
pub fn control_set(
    ctx: &Context,
    control_id: &str,
    raw_value: &str,
    message: Option<&str>,
) -> Result<ControlSet> {
    let control: Control = ctx.store().get_record(control_id)?;
    let viewer = ctx.require(&Route::AppDetail(control.app_id.clone()))?;

    let mut view = AppDetailView::new(ctx.store(), ctx.repository(), viewer, &control.app_id);
    view.load_controls()?;
    let change = view.set_value(control_id, parse_value(raw_value), message)?;
    Ok(ControlSet { change })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::commands::tests::signed_in;
    use crate::commands::{app_add, app_show};
    use crate::views::LiveValue;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("banner_v2"), json!("banner_v2"));
    }

    #[test]
    fn test_set_value_commits_and_shows_live() {
        let (dir, ctx) = signed_in();
        let config_path = dir.path().join("repo/ads.json");
        std::fs::write(&config_path, r#"{"ads": {"unit": "old"}, "other": 1}"#).unwrap();
        let app = app_add(&ctx, "Ads", "android", "ads.json", None).unwrap().app;
        let control = control_add(&ctx, &app.id, "Unit", "ads.unit", Some("Banner unit")).unwrap();

        let set = control_set(&ctx, &control.control.id, "new-unit", Some("rotate unit")).unwrap();
        assert_eq!(set.change.previous, Some(json!("old")));
        assert_eq!(set.change.commit.message, "rotate unit");
        assert!(set.to_human().starts_with("Set ads.unit = new-unit (was old)"));

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(written, json!({"ads": {"unit": "new-unit"}, "other": 1}));

        let detail = app_show(&ctx, &app.id).unwrap();
        assert_eq!(detail.controls[0].live, LiveValue::Present(json!("new-unit")));
    }

    #[test]
    fn test_set_value_without_config_document() {
        let (_dir, ctx) = signed_in();
        let app = app_add(&ctx, "Ads", "ios", "missing.json", None).unwrap().app;
        let control = control_add(&ctx, &app.id, "Unit", "ads.unit", None).unwrap();

        let err = control_set(&ctx, &control.control.id, "x", None).err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_control_rm() {
        let (_dir, ctx) = signed_in();
        let app = app_add(&ctx, "Ads", "ios", "ads.json", None).unwrap().app;
        let control = control_add(&ctx, &app.id, "Unit", "ads.unit", None).unwrap();

        let removed = control_rm(&ctx, &control.control.id).unwrap();
        assert_eq!(removed.app_id, app.id);
        assert!(app_show(&ctx, &app.id).unwrap().controls.is_empty());
        assert!(matches!(
            control_rm(&ctx, &control.control.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_control_add_rejects_blank_key() {
        let (_dir, ctx) = signed_in();
        let app = app_add(&ctx, "Ads", "ios", "ads.json", None).unwrap().app;
        assert!(matches!(
            control_add(&ctx, &app.id, "Unit", "  ", None),
            Err(Error::Validation(_))
        ));
    }
}
