use serde::{Deserialize, Serialize};

/// Fixed body returned by `POST /logout`.
pub const LOGOUT_SUCCESS: &str = "logout success";

/// Body accepted by `POST /signup` (JSON or urlencoded form)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SignupRequest {
    /// Check the fields a new local account needs.
    ///
    /// Returns a human readable reason on the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("username is required".to_string());
        }
        if self.password.is_empty() {
            return Err("password is required".to_string());
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err("display_name cannot be blank".to_string());
            }
        }
        Ok(())
    }
}

/// Body accepted by `POST /login` (JSON or urlencoded form)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `{ "message": ... }` payload used for logout and credential rejections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn logout_success() -> Self {
        Self::new(LOGOUT_SUCCESS)
    }
}
