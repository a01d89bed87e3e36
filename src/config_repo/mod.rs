//! Config repository client.
//!
//! Reads and writes one JSON config file in a version-controlled store. Every
//! read returns a [`VersionToken`] describing the file's current state; a
//! write must present the token from the most recent read of the same file
//! and is rejected with [`Error::VersionConflict`] when the file has moved on
//! since then. Two writers holding the same stale token can never both win.
//!
//! Backends:
//! - [`GitHubRepository`] - the GitHub contents API (token-authenticated)
//! - [`DirRepository`] - a plain directory, for offline use and tests
//!
//! `fetch` is safe to retry. `commit` is not: after a failure of unknown
//! outcome, fetch again to learn the current token before retrying.

pub mod github;
pub mod local;

pub use github::GitHubRepository;
pub use local::DirRepository;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Error, Result};

/// Opaque compare-and-swap token for one state of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded config file together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDocument {
    pub content: Value,
    pub version: VersionToken,
}

/// Metadata about a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    /// Token for the file state the write produced
    pub version: VersionToken,
    /// Commit identifier, when the backend records commits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A store holding JSON config files.
pub trait ConfigRepository: Send + Sync {
    /// Read and decode `filename`.
    ///
    /// Fails with `NotFound` when the file does not exist, `Decode` when its
    /// contents are not JSON, and `Transport` for anything else.
    fn fetch(&self, filename: &str) -> Result<ConfigDocument>;

    /// Replace `filename` with `content`, provided it is still at `version`.
    ///
    /// A `message` of `None` uses [`default_commit_message`].
    fn commit(
        &self,
        filename: &str,
        content: &Value,
        version: &VersionToken,
        message: Option<&str>,
    ) -> Result<CommitInfo>;

    /// Human-readable location of the repository.
    fn location(&self) -> String;
}

/// Check that `filename` is a non-empty path relative to the repository root.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(Error::Validation("config filename is empty".to_string()));
    }
    if filename.starts_with('/') || filename.starts_with('\\') {
        return Err(Error::Validation(format!(
            "config filename must be relative: {}",
            filename
        )));
    }
    if filename
        .split(['/', '\\'])
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::Validation(format!(
            "config filename has an invalid path segment: {}",
            filename
        )));
    }
    Ok(())
}

/// Commit message used when the caller gives none.
pub fn default_commit_message(filename: &str) -> String {
    format!("Updated {} via appconfigs", filename)
}

/// Serialize a document the way it is stored: JSON with two-space indentation.
pub fn to_canonical_text(content: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(content)?)
}

/// Encode a document for transport (canonical text, base64).
pub fn encode(content: &Value) -> Result<String> {
    Ok(STANDARD.encode(to_canonical_text(content)?))
}

/// Decode a transported document.
///
/// Line breaks inside the base64 payload are ignored; the contents API wraps
/// its output at 60 columns.
pub fn decode(encoded: &str) -> Result<Value> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64 content: {}", e)))?;
    parse_document(&bytes)
}

/// Parse raw file bytes as a JSON document.
pub(crate) fn parse_document(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Decode(format!("content is not UTF-8: {}", e)))?;
    serde_json::from_str(text).map_err(|e| Error::Decode(format!("content is not JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_roundtrip() {
        let docs = [
            json!({"ads": {"banner": "unit_123", "enabled": true}}),
            json!([1, 2.5, null, "é ✓"]),
            json!("plain"),
            json!({}),
        ];
        for doc in docs {
            assert_eq!(decode(&encode(&doc).unwrap()).unwrap(), doc);
        }
    }

    #[test]
    fn test_decode_ignores_line_wrapping() {
        let encoded = encode(&json!({"level": {"difficulty": "hard"}})).unwrap();
        let wrapped: String = encoded
            .as_bytes()
            .chunks(10)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        assert_eq!(
            decode(&wrapped).unwrap(),
            json!({"level": {"difficulty": "hard"}})
        );
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let encoded = STANDARD.encode("not json {");
        assert!(matches!(decode(&encoded), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(decode("***"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_canonical_text_preserves_key_order() {
        let doc: Value = serde_json::from_str(r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        assert_eq!(
            to_canonical_text(&doc).unwrap(),
            "{\n  \"zeta\": 1,\n  \"alpha\": 2\n}"
        );
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("connect_3d.json").is_ok());
        assert!(validate_filename("configs/connect_3d.json").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("/etc/passwd").is_err());
        assert!(validate_filename("../secrets.json").is_err());
        assert!(validate_filename("configs//a.json").is_err());
    }

    #[test]
    fn test_default_commit_message() {
        assert_eq!(
            default_commit_message("f.json"),
            "Updated f.json via appconfigs"
        );
    }
}
