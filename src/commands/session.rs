//! `appcfg login`, `logout`, and `whoami`.

use serde::Serialize;

use super::{Context, Output, json_string};
use crate::Result;
use crate::shell::Viewer;
use crate::storage::BackendType;
use crate::views::{LoginForm, LoginView};

#[derive(Serialize)]
pub struct LoginResult {
    #[serde(flatten)]
    pub viewer: Viewer,
    /// Page the front end would land on
    pub landing: String,
}

impl Output for LoginResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Signed in as {} ({})\nLanding page: {}",
            self.viewer.email(),
            self.viewer.role,
            self.landing
        )
    }
}

pub fn login(ctx: Context, email: &str, password: &str) -> Result<LoginResult> {
    let (viewer, landing) = {
        let view = LoginView::new(ctx.shell());
        view.submit(&LoginForm::new(email, password))?
    };

    // The hosted store was opened with the anonymous key; reconnect with the
    // new session so the role comes back through row-level security.
    let viewer = if ctx.env.backend() == BackendType::Hosted {
        let ctx = ctx.reload()?;
        ctx.shell().viewer().unwrap_or(viewer)
    } else {
        viewer
    };

    Ok(LoginResult {
        viewer,
        landing: landing.to_string(),
    })
}

#[derive(Serialize)]
pub struct LogoutResult {
    pub signed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Output for LogoutResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match (&self.email, self.signed_out) {
            (Some(email), true) => format!("Signed out {}", email),
            _ => "Not signed in".to_string(),
        }
    }
}

pub fn logout(ctx: &Context) -> Result<LogoutResult> {
    let viewer = ctx.shell().viewer();
    ctx.shell().sign_out()?;
    Ok(LogoutResult {
        signed_out: viewer.is_some(),
        email: viewer.map(|v| v.email().to_string()),
    })
}

#[derive(Serialize)]
pub struct WhoAmI {
    pub signed_in: bool,
    pub backend: BackendType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<Viewer>,
}

impl Output for WhoAmI {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match &self.viewer {
            Some(viewer) => {
                let mut out = format!(
                    "{} ({})\nUser id: {}\nBackend: {}",
                    viewer.email(),
                    viewer.role,
                    viewer.user_id(),
                    self.backend.as_str()
                );
                if let Some(expires_at) = viewer.session.expires_at {
                    out.push_str(&format!(
                        "\nSession expires: {}",
                        expires_at.format("%Y-%m-%d %H:%M UTC")
                    ));
                }
                out
            }
            None => format!("Not signed in (backend: {})", self.backend.as_str()),
        }
    }
}

pub fn whoami(ctx: &Context) -> Result<WhoAmI> {
    let viewer = ctx.shell().viewer();
    Ok(WhoAmI {
        signed_in: viewer.is_some(),
        backend: ctx.env.backend(),
        viewer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::commands::{Environment, system_init};
    use crate::config::{Overrides, Paths};

    fn initialized(dir: &tempfile::TempDir) -> Environment {
        let paths = Paths::new(dir.path().join("config"), dir.path().join("data"));
        let env = Environment::from_paths(paths, &Overrides::new()).unwrap();
        system_init(&env, Some(("admin@example.com", "secret-pw"))).unwrap();
        env
    }

    #[test]
    fn test_login_whoami_logout() {
        let dir = tempfile::tempdir().unwrap();
        let env = initialized(&dir);

        let ctx = Context::open(env.clone()).unwrap();
        assert!(!whoami(&ctx).unwrap().signed_in);

        let result = login(ctx, "admin@example.com", "secret-pw").unwrap();
        assert!(result.viewer.is_admin());
        assert_eq!(result.landing, "/");
        let json = result.to_json();
        assert!(json.contains("\"email\":\"admin@example.com\""));
        assert!(!json.contains("access_token"));

        // A new invocation restores the session from state.kdl.
        let ctx = Context::open(env.reload().unwrap()).unwrap();
        let me = whoami(&ctx).unwrap();
        assert!(me.signed_in);
        assert!(me.to_human().starts_with("admin@example.com (admin)"));

        let out = logout(&ctx).unwrap();
        assert!(out.signed_out);
        let ctx = Context::open(env.reload().unwrap()).unwrap();
        assert!(!whoami(&ctx).unwrap().signed_in);
        assert!(!logout(&ctx).unwrap().signed_out);
    }

    #[test]
    fn test_login_with_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let env = initialized(&dir);
        let ctx = Context::open(env).unwrap();

        let err = login(ctx, "admin@example.com", "nope-nope").err().unwrap();
        assert!(matches!(err, Error::Auth(_)));
    }
}
