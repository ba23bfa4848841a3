//! Signing and verification of session tokens.
//!
//! The token is an HS256 JWT keyed with `COOKIE_ENCRYPTION_KEY`; it is the
//! entire session state, nothing is kept server side.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use super::types::{Claims, SessionConfig};

/// Create a new session token for a user.
pub fn create_token(
    config: &SessionConfig,
    user_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    create_token_at(config, user_id, Utc::now())
}

pub(crate) fn create_token_at(
    config: &SessionConfig,
    user_id: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        iat: issued_at.timestamp(),
        exp: (issued_at + config.max_age).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate a session token and return claims.
pub fn validate_token(
    config: &SessionConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Check if token should be refreshed (older than 1 day).
pub fn should_refresh(claims: &Claims) -> bool {
    let age = Utc::now().timestamp() - claims.iat;
    age > Duration::days(1).num_seconds()
}
