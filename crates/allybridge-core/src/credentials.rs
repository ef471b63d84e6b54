//! Credential vault value type.
//!
//! One username/password pair per client instance. The password never
//! appears in `Debug` output and the type is deliberately not
//! `Serialize`, so credentials cannot leak into logs or responses.

use serde::Deserialize;
use std::fmt;

/// A username/password pair for the platform login form.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The account username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns `true` if both parts are non-empty.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("frontdesk", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("frontdesk"));
        assert!(debug.contains("***"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_is_usable() {
        assert!(Credentials::new("a", "b").is_usable());
        assert!(!Credentials::new("", "b").is_usable());
        assert!(!Credentials::new("a", "").is_usable());
    }

    #[test]
    fn test_deserialize() {
        let creds: Credentials =
            serde_json::from_str(r#"{"username":"frontdesk","password":"hunter2"}"#).unwrap();
        assert_eq!(creds.username(), "frontdesk");
        assert_eq!(creds.password(), "hunter2");
    }
}
