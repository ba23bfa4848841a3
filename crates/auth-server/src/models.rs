// Document models stored in the `users` collection
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::google::ProviderProfile;

/// Which strategy owns a user's credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
        }
    }
}

/// User document.
///
/// Local accounts carry `password_hash`; provider accounts carry `provider_id`
/// (the provider's subject id). Optional fields are omitted from the stored
/// document when empty so the partial unique indexes only see real values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn local(username: &str, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: Some(password_hash),
            provider: AuthProvider::Local,
            provider_id: None,
            display_name,
            created_at: Utc::now(),
        }
    }

    /// Build a first-login record from a Google profile.
    ///
    /// Falls back to the subject id for the username when Google did not
    /// share an email address.
    pub fn google(profile: &ProviderProfile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: profile
                .email
                .clone()
                .unwrap_or_else(|| profile.subject.clone()),
            password_hash: None,
            provider: AuthProvider::Google,
            provider_id: Some(profile.subject.clone()),
            display_name: profile.name.clone(),
            created_at: Utc::now(),
        }
    }
}
