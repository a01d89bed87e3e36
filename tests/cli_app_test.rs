//! Integration tests for apps and controls: the dashboard, the app detail
//! page with live values, and committing control values.

mod common;

use common::{TestEnv, id_of};
use predicates::prelude::*;
use serde_json::json;

#[test]
fn test_app_add_list_show_rm() {
    let env = TestEnv::admin();

    let first = env.add_app("Weather", "weather.json");
    let second = env.add_app("News", "news/android.json");

    let list = env.json(&["app", "list"]);
    let apps = list["apps"].as_array().unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(id_of(&apps[0]), second, "newest app comes first");
    assert_eq!(apps[1]["platform"], "Android");

    let shown = env.json(&["app", "show", &first]);
    assert_eq!(shown["app"]["name"], "Weather");

    env.json(&["app", "rm", &first]);
    let list = env.json(&["app", "list"]);
    assert_eq!(list["apps"].as_array().unwrap().len(), 1);

    env.appcfg()
        .args(["app", "show", &first])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_app_add_validates_input() {
    let env = TestEnv::admin();

    for args in [
        ["--name", " ", "--platform", "ios", "--config-file", "a.json"],
        ["--name", "A", "--platform", "web", "--config-file", "a.json"],
        ["--name", "A", "--platform", "ios", "--config-file", "../a.json"],
    ] {
        env.appcfg()
            .args(["app", "add"])
            .args(args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid input"));
    }
    assert!(env.json(&["app", "list"])["apps"].as_array().unwrap().is_empty());
}

#[test]
fn test_live_values_on_app_detail() {
    let env = TestEnv::admin();
    env.write_config(
        "weather.json",
        &json!({"ads": {"banner": "top", "enabled": true}, "refresh": 30}),
    );
    let app = env.add_app("Weather", "weather.json");
    env.add_control(&app, "Banner", "ads.banner");
    env.add_control(&app, "Refresh", "refresh");
    env.add_control(&app, "Theme", "ui.theme");

    let detail = env.json(&["app", "show", &app]);
    assert_eq!(detail["config"]["status"], "loaded");
    assert_eq!(detail["config"]["filename"], "weather.json");

    let controls = detail["controls"].as_array().unwrap();
    assert_eq!(controls.len(), 3);
    assert_eq!(controls[0]["key_name"], "ads.banner", "controls are oldest first");
    assert_eq!(controls[0]["live"], json!({"state": "present", "value": "top"}));
    assert_eq!(controls[1]["live"]["value"], 30);
    assert_eq!(controls[2]["live"], json!({"state": "missing"}));

    env.appcfg()
        .args(["-H", "app", "show", &app])
        .assert()
        .success()
        .stdout(predicate::str::contains("(ads.banner) = top"))
        .stdout(predicate::str::contains("(ui.theme) = (key not found)"));
}

#[test]
fn test_unavailable_config_still_lists_controls() {
    let env = TestEnv::admin();
    let app = env.add_app("Weather", "weather.json");
    env.add_control(&app, "Banner", "ads.banner");

    let detail = env.json(&["app", "show", &app]);
    assert_eq!(detail["config"]["status"], "unavailable");
    assert_eq!(detail["config"]["kind"], "not_found");
    assert_eq!(detail["controls"][0]["live"]["state"], "unavailable");

    std::fs::write(env.repo_path().join("weather.json"), "{not json").unwrap();
    let detail = env.json(&["app", "show", &app]);
    assert_eq!(detail["config"]["kind"], "decode");
    assert_eq!(detail["controls"].as_array().unwrap().len(), 1);
}

#[test]
fn test_control_set_commits_value() {
    let env = TestEnv::admin();
    env.write_config("weather.json", &json!({"ads": {"banner": "top"}, "refresh": 30}));
    let app = env.add_app("Weather", "weather.json");
    let banner = env.add_control(&app, "Banner", "ads.banner");
    let flag = env.add_control(&app, "Beta", "features.beta.enabled");

    let change = env.json(&["control", "set", &banner, "bottom", "-m", "Move banner"]);
    assert_eq!(change["previous"], "top");
    assert_eq!(change["value"], "bottom");
    assert_eq!(change["commit"]["message"], "Move banner");

    let change = env.json(&["control", "set", &flag, "true"]);
    assert!(change["previous"].is_null());
    assert_eq!(change["value"], true);
    assert_eq!(
        change["commit"]["message"],
        "Updated weather.json via appconfigs"
    );

    assert_eq!(
        env.read_config("weather.json"),
        json!({
            "ads": {"banner": "bottom"},
            "refresh": 30,
            "features": {"beta": {"enabled": true}}
        })
    );

    let detail = env.json(&["app", "show", &app]);
    assert_eq!(detail["controls"][1]["live"]["value"], true);
}

#[test]
fn test_control_set_keeps_key_order() {
    let env = TestEnv::admin();
    std::fs::write(
        env.repo_path().join("order.json"),
        r#"{"zeta": 1, "alpha": {"b": 2, "a": 1}}"#,
    )
    .unwrap();
    let app = env.add_app("Order", "order.json");
    let control = env.add_control(&app, "B", "alpha.b");

    env.json(&["control", "set", &control, "3"]);
    let text = std::fs::read_to_string(env.repo_path().join("order.json")).unwrap();
    assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    assert!(text.find("\"b\"").unwrap() < text.find("\"a\"").unwrap());
}

#[test]
fn test_control_set_through_scalar_fails() {
    let env = TestEnv::admin();
    env.write_config("w.json", &json!({"ads": "off"}));
    let app = env.add_app("W", "w.json");
    let control = env.add_control(&app, "Banner", "ads.banner");

    env.appcfg()
        .args(["control", "set", &control, "top"])
        .assert()
        .failure();
    assert_eq!(env.read_config("w.json"), json!({"ads": "off"}));
}

#[test]
fn test_control_rm() {
    let env = TestEnv::admin();
    let app = env.add_app("Weather", "weather.json");
    let control = env.add_control(&app, "Banner", "ads.banner");

    env.json(&["control", "rm", &control]);
    let detail = env.json(&["app", "show", &app]);
    assert!(detail["controls"].as_array().unwrap().is_empty());

    env.appcfg()
        .args(["control", "rm", &control])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_removing_app_removes_its_controls() {
    let env = TestEnv::admin();
    let app = env.add_app("Weather", "weather.json");
    let control = env.add_control(&app, "Banner", "ads.banner");

    env.json(&["app", "rm", &app]);
    env.appcfg()
        .args(["control", "set", &control, "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}
