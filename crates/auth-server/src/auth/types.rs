//! Auth-related types and configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AuthProvider, User};
use crate::repository::StoreError;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "OAuth";

/// Session lifetime: 14 days.
pub const SESSION_MAX_AGE_MS: i64 = 1_209_600_000;

/// JWT Claims carried by the session cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Identity exposed to handlers once a session cookie has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub provider: AuthProvider,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            provider: user.provider,
        }
    }
}

/// Session cookie settings
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub max_age: Duration,
    pub secure: bool,
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>, secure: bool) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: SESSION_COOKIE_NAME.to_string(),
            max_age: Duration::milliseconds(SESSION_MAX_AGE_MS),
            secure,
        }
    }
}

/// What a strategy concluded about a set of credentials.
///
/// A rejection is a normal outcome, not an error; hard failures travel as
/// [`StrategyError`].
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(User),
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Identity provider error: {0}")]
    Provider(String),
}
