//! Integration tests for developer access: grants, the grant matrix, role
//! changes, and what a developer can see and do.

mod common;

use common::{ADMIN_EMAIL, ADMIN_PASSWORD, TestEnv, id_of};
use predicates::prelude::*;
use serde_json::json;

const DEV_EMAIL: &str = "dev@example.com";
const DEV_PASSWORD: &str = "dev-secret";

/// Admin session with one developer and two apps.
fn setup() -> (TestEnv, String, String, String) {
    let env = TestEnv::admin();
    let dev = env.add_developer(DEV_EMAIL, DEV_PASSWORD);
    let weather = env.add_app("Weather", "weather.json");
    let news = env.add_app("News", "news.json");
    (env, dev, weather, news)
}

#[test]
fn test_dev_list_matrix() {
    let (env, dev, weather, _news) = setup();

    let matrix = env.json(&["dev", "list"]);
    let rows = matrix["developers"].as_array().unwrap();
    assert_eq!(rows.len(), 1, "admins are not listed");
    assert_eq!(id_of(&rows[0]["user"]), dev);

    let apps = rows[0]["apps"].as_array().unwrap();
    assert_eq!(apps[0]["app_name"], "News", "apps are sorted by name");
    assert!(apps.iter().all(|a| a["granted"] == false));

    env.json(&["dev", "grant", DEV_EMAIL, "Weather"]);
    let matrix = env.json(&["dev", "list"]);
    let granted: Vec<_> = matrix["developers"][0]["apps"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["granted"] == true)
        .map(|a| a["app_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(granted, [weather]);
}

#[test]
fn test_toggle_twice_restores_access() {
    let (env, dev, weather, _news) = setup();

    let on = env.json(&["dev", "toggle", &dev, &weather]);
    assert_eq!(on["granted"], true);
    let off = env.json(&["dev", "toggle", &dev, &weather]);
    assert_eq!(off["granted"], false);

    let matrix = env.json(&["dev", "list"]);
    assert!(
        matrix["developers"][0]["apps"]
            .as_array()
            .unwrap()
            .iter()
            .all(|a| a["granted"] == false)
    );
}

#[test]
fn test_grant_and_revoke_are_idempotent() {
    let (env, dev, weather, _news) = setup();

    assert_eq!(env.json(&["dev", "grant", &dev, &weather])["changed"], true);
    assert_eq!(env.json(&["dev", "grant", &dev, &weather])["changed"], false);
    assert_eq!(env.json(&["dev", "revoke", &dev, &weather])["changed"], true);
    assert_eq!(env.json(&["dev", "revoke", &dev, &weather])["changed"], false);
}

#[test]
fn test_developer_sees_only_granted_apps() {
    let (env, _dev, weather, _news) = setup();
    env.write_config("weather.json", &json!({"ads": {"banner": "top"}}));
    let control = env.add_control(&weather, "Banner", "ads.banner");
    env.json(&["dev", "grant", DEV_EMAIL, &weather]);

    env.login(DEV_EMAIL, DEV_PASSWORD);
    let me = env.json(&["whoami"]);
    assert_eq!(me["viewer"]["role"], "developer");

    let list = env.json(&["app", "list"]);
    let apps = list["apps"].as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(id_of(&apps[0]), weather);

    // Developers configure granted apps.
    let change = env.json(&["control", "set", &control, "bottom"]);
    assert_eq!(change["value"], "bottom");
    assert_eq!(env.read_config("weather.json"), json!({"ads": {"banner": "bottom"}}));
}

#[test]
fn test_developer_is_refused_admin_actions() {
    let (env, _dev, weather, news) = setup();
    env.login(DEV_EMAIL, DEV_PASSWORD);

    env.appcfg()
        .args(["dev", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));

    env.appcfg()
        .args(["app", "add", "--name", "X", "--platform", "ios", "--config-file", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));

    env.appcfg()
        .args(["control", "add", &weather, "--name", "A", "--key", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));

    env.appcfg()
        .args(["app", "show", &news])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));
}

#[test]
fn test_role_change_takes_effect_on_next_command() {
    let (env, _dev, _weather, news) = setup();

    let user = env.json(&["dev", "role", DEV_EMAIL, "admin"]);
    assert_eq!(user["role"], "admin");
    assert!(env.json(&["dev", "list"])["developers"].as_array().unwrap().is_empty());

    env.login(DEV_EMAIL, DEV_PASSWORD);
    let detail = env.json(&["app", "show", &news]);
    assert_eq!(detail["app"]["name"], "News");

    env.appcfg()
        .args(["dev", "role", ADMIN_EMAIL, "developer"])
        .assert()
        .success();
    env.login(ADMIN_EMAIL, ADMIN_PASSWORD);
    assert_eq!(env.json(&["whoami"])["viewer"]["role"], "developer");
}

#[test]
fn test_admin_cannot_demote_themselves() {
    let env = TestEnv::admin();
    env.appcfg()
        .args(["dev", "role", ADMIN_EMAIL, "developer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("own admin role"));
}

#[test]
fn test_dev_add_rejects_duplicates() {
    let env = TestEnv::admin();
    env.add_developer(DEV_EMAIL, DEV_PASSWORD);

    env.appcfg()
        .args(["dev", "add", "--email", "DEV@example.com", "--password", "another-pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Already exists"));
}

#[test]
fn test_unknown_user_or_app() {
    let (env, dev, _weather, _news) = setup();

    env.appcfg()
        .args(["dev", "grant", "ghost@example.com", "Weather"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));

    env.appcfg()
        .args(["dev", "grant", &dev, "Missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_deleting_app_drops_its_grants() {
    let (env, dev, weather, news) = setup();
    env.json(&["dev", "grant", &dev, &weather]);
    env.json(&["app", "rm", &weather]);

    let matrix = env.json(&["dev", "list"]);
    let apps = matrix["developers"][0]["apps"].as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["app_id"], news.as_str());
}
