//! Per-user shared secrets.

use std::collections::HashMap;
use std::fmt;

/// Looks up the HMAC secret for an account.
pub trait CredentialProvider: Send + Sync {
    fn get_password(&self, username: &str) -> Option<Vec<u8>>;
}

/// A fixed in-memory table of `username -> secret`.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.insert(username, secret);
        self
    }

    pub fn insert(&mut self, username: impl Into<String>, secret: impl Into<Vec<u8>>) {
        self.secrets.insert(username.into(), secret.into());
    }

    /// Parse `user=secret` pairs separated by commas. Whitespace around
    /// names is ignored; the secret is everything after the first `=`.
    /// Errors name the 1-based entry only, never its text.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut credentials = Self::new();
        for (index, entry) in list.split(',').enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let number = index + 1;
            let (user, secret) = entry
                .split_once('=')
                .ok_or_else(|| format!("entry {number} is not user=secret"))?;
            let user = user.trim();
            if user.is_empty() {
                return Err(format!("entry {number} has an empty username"));
            }
            credentials.insert(user, secret.as_bytes());
        }
        Ok(credentials)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

// Only the user names are shown.
impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        users.sort_unstable();
        f.debug_struct("StaticCredentials")
            .field("users", &users)
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_password(&self, username: &str) -> Option<Vec<u8>> {
        self.secrets.get(username).cloned()
    }
}
