//! Configuration and state management for appconfigs.
//!
//! Two KDL files with different audiences:
//!
//! ## config.kdl - preferences (safe to sync across machines)
//!
//! Located at `$APPCFG_CONFIG_DIR/config.kdl` (default
//! `~/.config/appconfigs/config.kdl`). Holds the backend choice, store URL,
//! config repository coordinates, and output preferences.
//!
//! ## state.kdl - secrets and runtime state (machine-specific)
//!
//! Located at `$APPCFG_DATA_DIR/state.kdl` (default
//! `~/.local/share/appconfigs/state.kdl`). Holds the GitHub token, the
//! hosted store key, and the signed-in session.
//!
//! ## Security
//!
//! `state.kdl` is always written with 0600 permissions because it contains
//! secrets.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{Overrides, Paths, Resolved, Settings, ValueSource, resolve_settings};
pub use schema::{AppConfig, AppState, OutputFormat};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};

use kdl::KdlDocument;
use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

fn read_kdl(path: &Path) -> Result<Option<KdlDocument>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    text.parse::<KdlDocument>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Write `doc` atomically with the given Unix mode.
fn write_kdl(path: &Path, doc: &KdlDocument, mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(doc.to_string().as_bytes())?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }

    #[cfg(not(unix))]
    let _ = mode;

    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(unix)]
const CONFIG_MODE: u32 = CONFIG_FILE_MODE;
#[cfg(not(unix))]
const CONFIG_MODE: u32 = 0;
#[cfg(unix)]
const STATE_MODE: u32 = STATE_FILE_MODE;
#[cfg(not(unix))]
const STATE_MODE: u32 = 0;

/// Read config.kdl; a missing file yields the empty config.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    Ok(read_kdl(path)?
        .map(|doc| AppConfig::from_kdl(&doc))
        .unwrap_or_default())
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    config.validate()?;
    write_kdl(path, &config.to_kdl(), CONFIG_MODE)
}

/// Read state.kdl; a missing file yields the empty state.
pub fn load_state(path: &Path) -> Result<AppState> {
    Ok(read_kdl(path)?
        .map(|doc| AppState::from_kdl(&doc))
        .unwrap_or_default())
}

pub fn save_state(path: &Path, state: &AppState) -> Result<()> {
    write_kdl(path, &state.to_kdl(), STATE_MODE)
}
