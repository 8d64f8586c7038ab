//! Static shared credentials.
//!
//! The server accepts exactly one username/password pair, configured at
//! startup. The password is held as a [`SecretString`] so it never appears in
//! `Debug` output, and both fields are compared in constant time.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// The single accepted username/password pair.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks a presented pair against the configured one.
    ///
    /// Both comparisons always run, so the result does not reveal which field
    /// was wrong.
    #[must_use]
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self
            .password
            .expose_secret()
            .as_bytes()
            .ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_pair() {
        let creds = Credentials::new("user", "passwd");
        assert!(creds.verify("user", "passwd"));
    }

    #[test]
    fn rejects_either_field_wrong() {
        let creds = Credentials::new("user", "passwd");
        assert!(!creds.verify("user", "wrong"));
        assert!(!creds.verify("other", "passwd"));
        assert!(!creds.verify("", ""));
        assert!(!creds.verify("user", "passwd2"));
        assert!(!creds.verify("use", "passwd"));
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("user", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
