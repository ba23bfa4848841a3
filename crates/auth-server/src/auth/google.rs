//! Google OAuth2 strategy.
//!
//! The browser is sent to Google's consent screen with a random `state`
//! (stored in a short-lived cookie by the handler); the callback exchanges the
//! authorization code for tokens, fetches the userinfo profile and finds or
//! creates the matching user.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GoogleSettings;
use crate::models::{AuthProvider, User};
use crate::repository::{StoreError, UserStore};

use super::types::StrategyError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "openid email profile";

/// What we keep from a provider's userinfo response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Provider subject id
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// An OAuth2 authorization-code provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> AuthProvider;

    /// URL of the consent screen, carrying `state` for CSRF protection.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, StrategyError>;
}

pub struct GoogleProvider {
    settings: GoogleSettings,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(settings: GoogleSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(serde::Serialize)]
struct TokenRequest<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn provider(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.callback_url),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, StrategyError> {
        let token_response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&TokenRequest {
                code,
                client_id: &self.settings.client_id,
                client_secret: &self.settings.client_secret,
                redirect_uri: &self.settings.callback_url,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .map_err(|e| StrategyError::Provider(format!("Token exchange failed: {}", e)))?;

        if !token_response.status().is_success() {
            let status = token_response.status();
            let body = token_response.text().await.unwrap_or_default();
            return Err(StrategyError::Provider(format!(
                "Token exchange failed: {} - {}",
                status, body
            )));
        }

        let tokens: GoogleTokenResponse = token_response
            .json()
            .await
            .map_err(|e| StrategyError::Provider(format!("Invalid token response: {}", e)))?;

        let user_info: GoogleUserInfo = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| StrategyError::Provider(format!("Failed to get user info: {}", e)))?
            .json()
            .await
            .map_err(|e| StrategyError::Provider(format!("Invalid user info response: {}", e)))?;

        Ok(ProviderProfile {
            subject: user_info.id,
            email: user_info.email,
            name: user_info.name,
        })
    }
}

/// Run the code exchange and map the profile to a stored user, creating one
/// on first login.
pub async fn authenticate(
    store: &dyn UserStore,
    provider: &dyn IdentityProvider,
    code: &str,
) -> Result<User, StrategyError> {
    let profile = provider.exchange_code(code).await?;
    let kind = provider.provider();

    if let Some(user) = store.find_by_provider(kind, &profile.subject).await? {
        return Ok(user);
    }

    let user = match kind {
        AuthProvider::Google => User::google(&profile),
        AuthProvider::Local => {
            return Err(StrategyError::Provider(
                "local accounts cannot sign in through OAuth".to_string(),
            ))
        }
    };

    match store.insert(&user).await {
        Ok(()) => {
            tracing::info!("Created {} user {}", kind.as_str(), user.username);
            Ok(user)
        }
        // Another callback for the same subject won the race.
        Err(StoreError::Duplicate(_)) => store
            .find_by_provider(kind, &profile.subject)
            .await?
            .ok_or_else(|| {
                StrategyError::Provider("user vanished after duplicate insert".to_string())
            }),
        Err(e) => Err(e.into()),
    }
}
