//! Identity backed by the local SQLite database.
//!
//! Passwords are stored as salted SHA-256 hashes in the `credentials` table,
//! which is not part of the record-store surface. Sessions are opaque random
//! tokens with a fixed lifetime.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::rc::Rc;

use super::{
    IdentityService, Session, SessionCallback, SessionEvent, SessionFile, SessionNotifier,
    Subscription,
};
use crate::models::{NewUser, Role, User};
use crate::storage::{Query, RecordStoreExt, SqliteStore};
use crate::{Error, Result};

/// Lifetime of a local session.
pub const SESSION_TTL_HOURS: i64 = 24 * 7;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

pub struct LocalIdentity {
    store: Rc<SqliteStore>,
    sessions: SessionFile,
    notifier: SessionNotifier,
    ttl: Duration,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl LocalIdentity {
    pub fn new(store: Rc<SqliteStore>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            sessions: SessionFile::new(state_path),
            notifier: SessionNotifier::new(),
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set or replace a user's password.
    pub fn set_password(&self, user_id: &str, password: &str) -> Result<()> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let salt = uuid::Uuid::new_v4().simple().to_string();
        self.store
            .set_credentials(user_id, &salt, &hash_password(&salt, password))
    }

    /// Create a user with a password.
    pub fn register(&self, email: &str, password: &str, role: Role) -> Result<User> {
        let mut new_user = NewUser {
            email: email.to_string(),
            role,
        };
        new_user.validate()?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user: User = self.store.insert_record(&new_user)?;
        self.set_password(&user.id, password)?;
        tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "registered user");
        Ok(user)
    }

    fn find_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .store
            .select_records::<User>(&Query::new().eq("email", email.trim().to_lowercase()))?
            .into_iter()
            .next())
    }

    fn discard(&self, reason: &str) -> Result<()> {
        if self.sessions.clear()? {
            tracing::info!(reason, "discarding stored session");
            self.notifier.emit(&SessionEvent::SignedOut);
        }
        Ok(())
    }
}

impl IdentityService for LocalIdentity {
    fn current_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.sessions.load()? else {
            return Ok(None);
        };

        if session.is_expired_at(Utc::now()) {
            self.discard("expired")?;
            return Ok(None);
        }

        // The account may have been deleted since sign-in.
        let exists = !self
            .store
            .select_records::<User>(&Query::new().eq("id", session.user_id.as_str()))?
            .is_empty();
        if !exists {
            self.discard("user no longer exists")?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn on_session_changed(&self, callback: SessionCallback) -> Subscription {
        self.notifier.subscribe(callback)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let user = self
            .find_user(email)?
            .ok_or_else(|| Error::Auth(INVALID_CREDENTIALS.to_string()))?;
        let (salt, expected) = self
            .store
            .credentials(&user.id)?
            .ok_or_else(|| Error::Auth(INVALID_CREDENTIALS.to_string()))?;

        if hash_password(&salt, password) != expected {
            tracing::warn!(email = %user.email, "rejected sign-in");
            return Err(Error::Auth(INVALID_CREDENTIALS.to_string()));
        }

        let session = Session {
            user_id: user.id,
            email: user.email,
            access_token: uuid::Uuid::new_v4().simple().to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + self.ttl),
        };
        self.sessions.save(&session)?;
        tracing::info!(user_id = %session.user_id, "signed in");
        self.notifier.emit(&SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) -> Result<()> {
        if self.sessions.clear()? {
            tracing::info!("signed out");
            self.notifier.emit(&SessionEvent::SignedOut);
        }
        Ok(())
    }
}
