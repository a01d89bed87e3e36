//! appconfigs - administration of mobile-app remote configuration.
//!
//! This library provides the core functionality for the `appcfg` CLI tool:
//! registering apps, defining controls that point at keys inside each app's
//! JSON config file, granting developers access per app, and reading or
//! committing live values through a version-controlled config repository.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod config_repo;
pub mod identity;
pub mod keypath;
pub mod models;
pub mod shell;
pub mod storage;
pub mod views;


/// Library-level error type for appconfigs operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not initialized: run `appcfg system init` first")]
    NotInitialized,

    #[error("Not signed in: run `appcfg login` first")]
    NotSignedIn,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for appconfigs operations.
pub type Result<T> = std::result::Result<T, Error>;
