//! GitHub contents API backend.
//!
//! Reads use `GET /repos/{owner}/{repo}/contents/{path}`; writes use `PUT` on
//! the same path with the blob SHA from the last read as the expected
//! version. GitHub answers a stale SHA with 409 Conflict.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{
    CommitInfo, ConfigDocument, ConfigRepository, VersionToken, decode, default_commit_message,
    encode, validate_filename,
};
use crate::{Error, Result};

/// GitHub API base URL
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// User-Agent header required by GitHub API
const USER_AGENT: &str = "appconfigs-cli";

/// REST API version pinned in every request
const API_VERSION: &str = "2022-11-28";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes escaped inside one path segment of the contents URL.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// Response from GET contents (only fields we care about).
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    /// "file", "dir", "symlink" or "submodule"
    #[serde(rename = "type", default)]
    kind: Option<String>,
    /// Transport encoding of `content`, normally "base64"
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
    /// Blob SHA, used as the version token
    sha: String,
}

/// Request body for PUT contents.
#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    content: UpdatedContent,
    commit: UpdatedCommit,
}

#[derive(Debug, Deserialize)]
struct UpdatedContent {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatedCommit {
    sha: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

/// A config repository hosted on GitHub.
///
/// Without an access token every call fails with `Transport`; the client is
/// still constructible so the rest of the application keeps working.
#[derive(Clone)]
pub struct GitHubRepository {
    api_base: String,
    owner: String,
    repo: String,
    branch: Option<String>,
    token: Option<String>,
    agent: ureq::Agent,
}

impl GitHubRepository {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_base: GITHUB_API_BASE.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
            token: None,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch.filter(|b| !b.trim().is_empty());
        self
    }

    /// Point the client at another API host (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, filename: &str) -> String {
        let path: Vec<String> = filename
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.join("/")
        )
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            Error::Transport("no GitHub access token configured".to_string())
        })
    }

    fn authorized(&self, request: ureq::Request, token: &str) -> ureq::Request {
        request
            .set("Authorization", &format!("Bearer {}", token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", USER_AGENT)
            .set("X-GitHub-Api-Version", API_VERSION)
    }
}

impl ConfigRepository for GitHubRepository {
    fn fetch(&self, filename: &str) -> Result<ConfigDocument> {
        validate_filename(filename)?;
        let token = self.token()?;

        let mut request = self.authorized(self.agent.get(&self.contents_url(filename)), token);
        if let Some(branch) = &self.branch {
            request = request.query("ref", branch);
        }

        tracing::debug!(filename, repo = %self.location(), "fetching config file");

        match request.call() {
            Ok(resp) => {
                let body: ContentsResponse = resp
                    .into_json()
                    .map_err(|e| Error::Transport(format!("unreadable GitHub response: {}", e)))?;

                if let Some(kind) = body.kind.as_deref().filter(|k| *k != "file") {
                    return Err(Error::NotFound(format!(
                        "{} is a {} in {}, not a file",
                        filename,
                        kind,
                        self.location()
                    )));
                }
                if let Some(encoding) = body.encoding.as_deref().filter(|e| *e != "base64") {
                    return Err(Error::Decode(format!(
                        "{} has unsupported encoding '{}' (file too large for the contents API?)",
                        filename, encoding
                    )));
                }
                let content = body
                    .content
                    .ok_or_else(|| Error::Decode(format!("{} has no content", filename)))?;

                Ok(ConfigDocument {
                    content: decode(&content)?,
                    version: VersionToken::new(body.sha),
                })
            }
            Err(ureq::Error::Status(404, _)) => Err(Error::NotFound(format!(
                "File {} not found in repository {}",
                filename,
                self.location()
            ))),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Transport(format!("HTTP {}: {}", code, body)))
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn commit(
        &self,
        filename: &str,
        content: &Value,
        version: &VersionToken,
        message: Option<&str>,
    ) -> Result<CommitInfo> {
        validate_filename(filename)?;
        let token = self.token()?;

        let default_message = default_commit_message(filename);
        let message = message.unwrap_or(&default_message);
        let body = UpdateRequest {
            message,
            content: encode(content)?,
            sha: version.as_str(),
            branch: self.branch.as_deref(),
        };

        tracing::debug!(filename, %version, repo = %self.location(), "committing config file");

        let response = self
            .authorized(self.agent.put(&self.contents_url(filename)), token)
            .send_json(&body);

        match response {
            Ok(resp) => {
                let body: UpdateResponse = resp
                    .into_json()
                    .map_err(|e| Error::Transport(format!("unreadable GitHub response: {}", e)))?;

                Ok(CommitInfo {
                    version: VersionToken::new(body.content.sha),
                    commit_sha: Some(body.commit.sha),
                    message: body.commit.message.unwrap_or_else(|| message.to_string()),
                    url: body.commit.html_url.or(body.content.html_url),
                })
            }
            Err(ureq::Error::Status(409, _)) => Err(Error::VersionConflict(format!(
                "{} changed since version {}",
                filename, version
            ))),
            Err(ureq::Error::Status(422, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                if body.contains("sha") {
                    Err(Error::VersionConflict(format!(
                        "{} rejected version {}: {}",
                        filename, version, body
                    )))
                } else {
                    Err(Error::Transport(format!("HTTP 422: {}", body)))
                }
            }
            Err(ureq::Error::Status(404, _)) => Err(Error::NotFound(format!(
                "Repository {} not found or not writable",
                self.location()
            ))),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Transport(format!("HTTP {}: {}", code, body)))
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn location(&self) -> String {
        match &self.branch {
            Some(branch) => format!("{}/{}@{}", self.owner, self.repo, branch),
            None => format!("{}/{}", self.owner, self.repo),
        }
    }
}
