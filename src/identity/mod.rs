//! Identity service: sign-in, sign-out, and session-change notifications.
//!
//! Two implementations:
//! - [`LocalIdentity`] - passwords checked against the local database
//! - [`RemoteIdentity`] - a hosted GoTrue-compatible auth API
//!
//! Both persist the current session in the `session` block of `state.kdl`
//! so that it survives between CLI invocations, and both announce every
//! transition (sign-in, sign-out, token refresh) exactly once to each live
//! subscriber.

pub mod local;
pub mod remote;

pub use local::LocalIdentity;
pub use remote::RemoteIdentity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::Result;
use crate::config::{load_state, save_state};

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the access token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl SessionEvent {
    /// The session after the transition, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionEvent::SignedIn(s) | SessionEvent::TokenRefreshed(s) => Some(s),
            SessionEvent::SignedOut => None,
        }
    }
}

/// Callback invoked on session transitions.
pub type SessionCallback = Box<dyn Fn(&SessionEvent)>;

/// Session lifecycle operations.
pub trait IdentityService {
    /// The current session, refreshing or discarding it if it has expired.
    fn current_session(&self) -> Result<Option<Session>>;

    /// Register a callback for future session transitions.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped.
    fn on_session_changed(&self, callback: SessionCallback) -> Subscription;

    /// Sign in with email and password.
    ///
    /// Fails with `Auth` when the credentials are rejected.
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// End the current session, if there is one.
    fn sign_out(&self) -> Result<()>;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Rc<dyn Fn(&SessionEvent)>)>,
}

/// Fan-out of session events to subscribers.
#[derive(Clone, Default)]
pub struct SessionNotifier {
    listeners: Rc<RefCell<Listeners>>,
}

impl SessionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: SessionCallback) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Rc::from(callback)));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    /// Deliver `event` to every subscriber registered at the time of the call.
    pub fn emit(&self, event: &SessionEvent) {
        // Snapshot first so callbacks may subscribe or unsubscribe.
        let snapshot: Vec<Rc<dyn Fn(&SessionEvent)>> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();

        tracing::debug!(?event, subscribers = snapshot.len(), "session changed");
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Keeps a session callback registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<RefCell<Listeners>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut listeners) = listeners.try_borrow_mut() {
                listeners.entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// The session slot inside `state.kdl`.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>> {
        Ok(load_state(&self.path)?.session)
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let mut state = load_state(&self.path)?;
        state.session = Some(session.clone());
        save_state(&self.path, &state)
    }

    /// Remove the stored session. Returns whether one was present.
    pub fn clear(&self) -> Result<bool> {
        let mut state = load_state(&self.path)?;
        if state.session.take().is_none() {
            return Ok(false);
        }
        save_state(&self.path, &state)?;
        Ok(true)
    }
}
