//! Username/password strategy.

use shared_types::SignupRequest;

use crate::models::User;
use crate::repository::UserStore;

use super::password;
use super::types::{AuthOutcome, StrategyError};

pub const NO_USER_FOUND: &str = "no user found";
pub const BAD_PASSWORD: &str = "bad password";

pub struct LocalStrategy<'a> {
    store: &'a dyn UserStore,
}

impl<'a> LocalStrategy<'a> {
    pub fn new(store: &'a dyn UserStore) -> Self {
        Self { store }
    }

    /// Check a username/password pair against the stored Argon2 hash.
    ///
    /// Unknown users and wrong passwords are rejections; only store or
    /// hashing failures are errors.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome, StrategyError> {
        let Some(user) = self.store.find_local(username.trim()).await? else {
            return Ok(AuthOutcome::Rejected(NO_USER_FOUND.to_string()));
        };

        let Some(hash) = user.password_hash.clone() else {
            tracing::warn!("Local account {} has no password hash", user.username);
            return Ok(AuthOutcome::Rejected(BAD_PASSWORD.to_string()));
        };

        let candidate = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
                .await
                .map_err(|e| StrategyError::Hashing(e.to_string()))?
                .map_err(|e| StrategyError::Hashing(e.to_string()))?;

        if matches {
            Ok(AuthOutcome::Authenticated(user))
        } else {
            Ok(AuthOutcome::Rejected(BAD_PASSWORD.to_string()))
        }
    }

    /// Create a local account. The password is hashed here, before the
    /// record reaches the store.
    pub async fn register(&self, request: SignupRequest) -> Result<User, StrategyError> {
        let SignupRequest {
            username,
            password,
            display_name,
        } = request;

        let hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| StrategyError::Hashing(e.to_string()))?
            .map_err(|e| StrategyError::Hashing(e.to_string()))?;

        let display_name = display_name.map(|name| name.trim().to_string());
        let user = User::local(username.trim(), hash, display_name);
        self.store.insert(&user).await?;

        Ok(user)
    }
}
