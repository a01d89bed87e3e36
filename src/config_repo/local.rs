//! Directory-backed config repository.
//!
//! Files live under a root directory. The version token is the SHA-256 of
//! the file bytes, so any change to a file (through this client or not)
//! invalidates tokens handed out before it.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    CommitInfo, ConfigDocument, ConfigRepository, VersionToken, default_commit_message,
    parse_document, to_canonical_text, validate_filename,
};
use crate::{Error, Result};

/// A config repository kept in a local directory.
#[derive(Debug)]
pub struct DirRepository {
    root: PathBuf,
    /// Serializes compare-and-swap within this process
    write_lock: Mutex<()>,
}

impl DirRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.root.join(filename);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(format!(
                "File {} not found in repository {}",
                filename,
                self.root.display()
            )),
            _ => Error::Transport(format!("failed to read {}: {}", path.display(), e)),
        })
    }
}

/// Version token for a file's bytes.
pub fn version_of(bytes: &[u8]) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    VersionToken::new(format!("{:x}", hasher.finalize()))
}

/// Replace `path` with `bytes` through a temp file in the same directory.
///
/// Every I/O failure on the way is a `Transport` error.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    tempfile::NamedTempFile::new_in(dir)
        .and_then(|mut tmp| {
            tmp.write_all(bytes)?;
            tmp.persist(path).map_err(|e| e.error)
        })
        .map(drop)
        .map_err(|e| Error::Transport(format!("failed to write {}: {}", path.display(), e)))
}

impl ConfigRepository for DirRepository {
    fn fetch(&self, filename: &str) -> Result<ConfigDocument> {
        validate_filename(filename)?;
        let bytes = self.read(filename)?;
        Ok(ConfigDocument {
            content: parse_document(&bytes)?,
            version: version_of(&bytes),
        })
    }

    fn commit(
        &self,
        filename: &str,
        content: &Value,
        version: &VersionToken,
        message: Option<&str>,
    ) -> Result<CommitInfo> {
        validate_filename(filename)?;
        let text = to_canonical_text(content)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Other("config repository lock poisoned".to_string()))?;

        let current = version_of(&self.read(filename)?);
        if &current != version {
            return Err(Error::VersionConflict(format!(
                "{} is at version {} but version {} was expected",
                filename, current, version
            )));
        }

        write_atomically(&self.root.join(filename), text.as_bytes())?;

        let new_version = version_of(text.as_bytes());
        tracing::info!(filename, from = %version, to = %new_version, "committed config file");

        Ok(CommitInfo {
            version: new_version,
            commit_sha: None,
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| default_commit_message(filename)),
            url: None,
        })
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
