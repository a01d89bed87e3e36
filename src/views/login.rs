use crate::shell::{Route, Shell, Viewer};
use crate::{Error, Result};

/// Credentials as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Both fields are required; nothing is sent until they are present.
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(Error::Validation("email is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(Error::Validation("password is required".to_string()));
        }
        Ok(())
    }
}

pub struct LoginView<'a> {
    shell: &'a Shell,
}

impl<'a> LoginView<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Self { shell }
    }

    /// Sign in and return the viewer together with the route to land on.
    pub fn submit(&self, form: &LoginForm) -> Result<(Viewer, Route)> {
        form.validate()?;
        let viewer = self.shell.sign_in(form.email.trim(), &form.password)?;
        Ok((viewer, self.shell.navigate(Route::Login)))
    }
}
