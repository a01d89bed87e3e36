//! Application shell: session state, role lookup, and route guards.
//!
//! The shell is the composition point between the identity service and the
//! record store. It caches the signed-in [`Viewer`] and keeps it current by
//! listening to session transitions: the role is looked up again on sign-in
//! and token refresh, and cleared on sign-out.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::identity::{IdentityService, Session, SessionEvent, Subscription};
use crate::models::{Role, User};
use crate::storage::{Query, RecordStore, RecordStoreExt};
use crate::{Error, Result};

/// Destinations of the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    AppDetail(String),
    Developers,
}

impl Route {
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => write!(f, "/login"),
            Route::Dashboard => write!(f, "/"),
            Route::AppDetail(id) => write!(f, "/apps/{}", id),
            Route::Developers => write!(f, "/developers"),
        }
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Allow,
    Redirect(Route),
}

/// The signed-in user as seen by views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    #[serde(flatten)]
    pub session: Session,
    pub role: Role,
}

impl Viewer {
    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    pub fn email(&self) -> &str {
        &self.session.email
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Fail with `Forbidden` unless the viewer is an admin.
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{} requires the admin role", action)))
        }
    }
}

/// Look up the role of `user_id`.
///
/// Lookup failures never block a signed-in shell: they are logged and the
/// user is treated as a developer.
pub fn lookup_role(store: &dyn RecordStore, user_id: &str) -> Role {
    match store.select_records::<User>(&Query::new().eq("id", user_id)) {
        Ok(users) => match users.into_iter().next() {
            Some(user) => user.role,
            None => {
                tracing::warn!(user_id, "no user record for session; assuming developer");
                Role::Developer
            }
        },
        Err(e) => {
            tracing::warn!(user_id, error = %e, "role lookup failed; assuming developer");
            Role::Developer
        }
    }
}

fn apply_event(viewer: &RefCell<Option<Viewer>>, store: &dyn RecordStore, event: &SessionEvent) {
    let next = event.session().map(|session| Viewer {
        session: session.clone(),
        role: lookup_role(store, &session.user_id),
    });
    *viewer.borrow_mut() = next;
}

pub struct Shell {
    identity: Rc<dyn IdentityService>,
    store: Rc<dyn RecordStore>,
    viewer: Rc<RefCell<Option<Viewer>>>,
    _subscription: Subscription,
}

impl Shell {
    /// Compose the shell and restore any persisted session.
    pub fn new(identity: Rc<dyn IdentityService>, store: Rc<dyn RecordStore>) -> Result<Self> {
        let viewer = Rc::new(RefCell::new(None));

        let subscription = {
            let viewer = Rc::clone(&viewer);
            let store = Rc::clone(&store);
            identity.on_session_changed(Box::new(move |event: &SessionEvent| {
                apply_event(&viewer, store.as_ref(), event)
            }))
        };

        if let Some(session) = identity.current_session()? {
            let role = lookup_role(store.as_ref(), &session.user_id);
            *viewer.borrow_mut() = Some(Viewer { session, role });
        }

        Ok(Self {
            identity,
            store,
            viewer,
            _subscription: subscription,
        })
    }

    pub fn store(&self) -> Rc<dyn RecordStore> {
        Rc::clone(&self.store)
    }

    pub fn identity(&self) -> &dyn IdentityService {
        self.identity.as_ref()
    }

    /// The signed-in viewer, if any.
    pub fn viewer(&self) -> Option<Viewer> {
        self.viewer.borrow().clone()
    }

    pub fn guard(&self, route: &Route) -> Guard {
        let viewer = self.viewer.borrow();
        match (viewer.as_ref(), route) {
            (None, Route::Login) => Guard::Allow,
            (None, _) => Guard::Redirect(Route::Login),
            (Some(_), Route::Login) => Guard::Redirect(Route::Dashboard),
            (Some(v), Route::Developers) if !v.is_admin() => Guard::Redirect(Route::Dashboard),
            (Some(_), _) => Guard::Allow,
        }
    }

    /// Follow redirects until a route is allowed.
    pub fn navigate(&self, route: Route) -> Route {
        let mut current = route;
        // Guards redirect at most twice (Developers -> Dashboard, or -> Login).
        for _ in 0..3 {
            match self.guard(&current) {
                Guard::Allow => break,
                Guard::Redirect(next) => current = next,
            }
        }
        current
    }

    /// The viewer allowed on `route`, or the error a command should report.
    pub fn require(&self, route: &Route) -> Result<Viewer> {
        match self.guard(route) {
            Guard::Allow => self.viewer().ok_or(Error::NotSignedIn),
            Guard::Redirect(Route::Login) => Err(Error::NotSignedIn),
            Guard::Redirect(_) if *route == Route::Login => Err(Error::Other(
                "already signed in; run `appcfg logout` first".to_string(),
            )),
            Guard::Redirect(_) => Err(Error::Forbidden(
                "this page requires the admin role".to_string(),
            )),
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Viewer> {
        self.identity.sign_in_with_password(email, password)?;
        self.viewer().ok_or(Error::NotSignedIn)
    }

    pub fn sign_out(&self) -> Result<()> {
        self.identity.sign_out()
    }
}
