//! Common test utilities for appcfg integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's `~/.config/appconfigs/` or `~/.local/share/appconfigs/`.

#![allow(dead_code)]

pub mod http;

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-secret";

/// Variables that would leak the developer's own setup into a test.
const INHERITED_VARS: &[&str] = &[
    "APPCFG_BACKEND",
    "APPCFG_STORE_URL",
    "APPCFG_STORE_KEY",
    "APPCFG_GITHUB_TOKEN",
    "APPCFG_REPO_OWNER",
    "APPCFG_REPO_NAME",
    "APPCFG_REPO_BRANCH",
    "APPCFG_GITHUB_API_URL",
    "APPCFG_PASSWORD",
    "APPCFG_ADMIN_PASSWORD",
    "APPCFG_NEW_PASSWORD",
    "APPCFG_LOG",
];

/// A test environment with isolated config, data, and config-repository directories.
///
/// The `appcfg()` method returns a `Command` that sets `APPCFG_CONFIG_DIR`,
/// `APPCFG_DATA_DIR`, and `APPCFG_REPO_DIR` per invocation, making tests
/// parallel-safe.
pub struct TestEnv {
    pub config_dir: TempDir,
    pub data_dir: TempDir,
    pub repo_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
            repo_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a test environment with a database and an admin account.
    pub fn init() -> Self {
        let env = Self::new();
        env.appcfg()
            .args([
                "system",
                "init",
                "--admin-email",
                ADMIN_EMAIL,
                "--admin-password",
                ADMIN_PASSWORD,
            ])
            .assert()
            .success();
        env
    }

    /// Like `init`, and signed in as the admin.
    pub fn admin() -> Self {
        let env = Self::init();
        env.login(ADMIN_EMAIL, ADMIN_PASSWORD);
        env
    }

    /// Get a Command for the appcfg binary with isolated directories.
    pub fn appcfg(&self) -> Command {
        let mut cmd = Command::cargo_bin("appcfg").unwrap();
        for var in INHERITED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("APPCFG_CONFIG_DIR", self.config_dir.path());
        cmd.env("APPCFG_DATA_DIR", self.data_dir.path());
        cmd.env("APPCFG_REPO_DIR", self.repo_dir.path());
        cmd
    }

    /// Run `appcfg` with `args`, expect success, and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.appcfg().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "appcfg {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
            panic!(
                "appcfg {:?} printed invalid JSON ({}): {}",
                args,
                e,
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }

    pub fn login(&self, email: &str, password: &str) {
        self.appcfg()
            .args(["login", "--email", email])
            .env("APPCFG_PASSWORD", password)
            .assert()
            .success();
    }

    /// Create a developer account (as the signed-in admin) and return its id.
    pub fn add_developer(&self, email: &str, password: &str) -> String {
        let user = self.json(&["dev", "add", "--email", email, "--password", password]);
        id_of(&user)
    }

    /// Register an app and return its id.
    pub fn add_app(&self, name: &str, config_file: &str) -> String {
        let app = self.json(&[
            "app",
            "add",
            "--name",
            name,
            "--platform",
            "android",
            "--config-file",
            config_file,
        ]);
        id_of(&app)
    }

    /// Define a control and return its id.
    pub fn add_control(&self, app_id: &str, name: &str, key: &str) -> String {
        let control = self.json(&["control", "add", app_id, "--name", name, "--key", key]);
        id_of(&control)
    }

    /// Write a config document into the config repository.
    pub fn write_config(&self, filename: &str, content: &Value) {
        let path = self.repo_dir.path().join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, serde_json::to_string_pretty(content).unwrap()).unwrap();
    }

    pub fn read_config(&self, filename: &str) -> Value {
        let text = std::fs::read_to_string(self.repo_dir.path().join(filename)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    pub fn config_path(&self) -> &Path {
        self.config_dir.path()
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn repo_path(&self) -> &Path {
        self.repo_dir.path()
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.path().join("state.kdl")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.path().join("config.kdl")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// The `id` field of a JSON record, as text.
pub fn id_of(record: &Value) -> String {
    match &record["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
