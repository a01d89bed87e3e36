//! Identity backed by a hosted GoTrue-compatible auth API.
//!
//! Endpoints used:
//! - `POST /auth/v1/token?grant_type=password` - sign in
//! - `POST /auth/v1/token?grant_type=refresh_token` - refresh an expired session
//! - `POST /auth/v1/logout` - revoke the session server-side

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use super::{
    IdentityService, Session, SessionCallback, SessionEvent, SessionFile, SessionNotifier,
    Subscription,
};
use crate::{Error, Result};

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Refresh this long before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Error body shapes returned by GoTrue versions.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> Session {
        let expires_at: Option<DateTime<Utc>> = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
            (None, None) => None,
        };
        Session {
            user_id: self.user.id,
            email: self
                .user
                .email
                .unwrap_or_else(|| fallback_email.to_string()),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

pub struct RemoteIdentity {
    base_url: String,
    api_key: String,
    sessions: SessionFile,
    notifier: SessionNotifier,
    agent: ureq::Agent,
}

impl RemoteIdentity {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            sessions: SessionFile::new(state_path),
            notifier: SessionNotifier::new(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn token_request(&self, grant_type: &str, body: serde_json::Value) -> Result<TokenResponse> {
        let response = self
            .agent
            .post(&self.auth_url("token"))
            .query("grant_type", grant_type)
            .set("apikey", &self.api_key)
            .set("Accept", "application/json")
            .send_json(body);

        match response {
            Ok(resp) => resp
                .into_json::<TokenResponse>()
                .map_err(|e| Error::Transport(format!("unreadable auth response: {}", e))),
            Err(ureq::Error::Status(code @ (400 | 401 | 403 | 422), resp)) => {
                let message = resp
                    .into_json::<AuthErrorBody>()
                    .ok()
                    .and_then(AuthErrorBody::into_message)
                    .unwrap_or_else(|| format!("HTTP {}", code));
                Err(Error::Auth(message))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Transport(format!("HTTP {}: {}", code, body)))
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn refresh(&self, stale: &Session, refresh_token: &str) -> Result<Option<Session>> {
        match self.token_request("refresh_token", json!({ "refresh_token": refresh_token })) {
            Ok(tokens) => {
                let session = tokens.into_session(&stale.email);
                self.sessions.save(&session)?;
                tracing::info!(user_id = %session.user_id, "refreshed session");
                self.notifier
                    .emit(&SessionEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            Err(Error::Auth(reason)) => {
                tracing::warn!(%reason, "refresh token rejected; signing out");
                if self.sessions.clear()? {
                    self.notifier.emit(&SessionEvent::SignedOut);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl IdentityService for RemoteIdentity {
    fn current_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.sessions.load()? else {
            return Ok(None);
        };

        let horizon = Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS);
        if !session.is_expired_at(horizon) {
            return Ok(Some(session));
        }

        match session.refresh_token.clone() {
            Some(refresh_token) => self.refresh(&session, &refresh_token),
            None => {
                if self.sessions.clear()? {
                    self.notifier.emit(&SessionEvent::SignedOut);
                }
                Ok(None)
            }
        }
    }

    fn on_session_changed(&self, callback: SessionCallback) -> Subscription {
        self.notifier.subscribe(callback)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim();
        let tokens = self.token_request(
            "password",
            json!({ "email": email, "password": password }),
        )?;
        let session = tokens.into_session(email);
        self.sessions.save(&session)?;
        tracing::info!(user_id = %session.user_id, "signed in");
        self.notifier.emit(&SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) -> Result<()> {
        let Some(session) = self.sessions.load()? else {
            return Ok(());
        };

        // Revocation is best effort; the local session is dropped regardless.
        let revoked = self
            .agent
            .post(&self.auth_url("logout"))
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", session.access_token))
            .call();
        if let Err(e) = revoked {
            tracing::warn!(error = %e, "server-side sign-out failed");
        }

        self.sessions.clear()?;
        tracing::info!("signed out");
        self.notifier.emit(&SessionEvent::SignedOut);
        Ok(())
    }
}
