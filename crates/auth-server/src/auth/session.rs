//! Cookie-backed sessions.
//!
//! [`load_session`] is the session stage of the request pipeline: it verifies
//! the signed cookie, re-loads the user it names and stores a [`Session`] in
//! the request extensions. Handlers write sessions with [`establish`] and
//! [`clear`], which produce `Set-Cookie` values.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};

use crate::app::AppState;
use crate::error::ApiResult;

use super::jwt;
use super::types::{AuthUser, SessionConfig};

/// Name of the short-lived cookie holding the OAuth `state` parameter.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_PATH: &str = "/auth/google";
const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// Request-scoped session view inserted by [`load_session`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<AuthUser>,
}

impl Session {
    pub fn authenticated(user: AuthUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Sign a session for `user_id` and return the `Set-Cookie` value.
pub fn establish(
    config: &SessionConfig,
    user_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let token = jwt::create_token(config, user_id)?;
    Ok(build_cookie(
        &config.cookie_name,
        &token,
        "/",
        config.max_age.num_seconds(),
        config.secure,
    ))
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear(config: &SessionConfig) -> String {
    build_cookie(&config.cookie_name, "", "/", 0, config.secure)
}

pub fn oauth_state_cookie(config: &SessionConfig, state: &str) -> String {
    build_cookie(
        OAUTH_STATE_COOKIE,
        state,
        OAUTH_STATE_PATH,
        OAUTH_STATE_MAX_AGE_SECS,
        config.secure,
    )
}

pub fn clear_oauth_state_cookie(config: &SessionConfig) -> String {
    build_cookie(OAUTH_STATE_COOKIE, "", OAUTH_STATE_PATH, 0, config.secure)
}

fn build_cookie(name: &str, value: &str, path: &str, max_age_secs: i64, secure: bool) -> String {
    Cookie::build((name.to_string(), value.to_string()))
        .path(path.to_string())
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::seconds(max_age_secs))
        .build()
        .to_string()
}

/// Find a cookie value in the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}

/// Session stage.
///
/// Pre: none. Post: the request carries a [`Session`] extension (anonymous
/// when the cookie is missing, invalid, expired or names an unknown user).
/// A valid session older than a day is re-issued on the response unless the
/// handler already set a cookie of its own.
pub async fn load_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let config = &state.session;

    let claims = read_cookie(request.headers(), &config.cookie_name).and_then(|token| {
        jwt::validate_token(config, &token)
            .map_err(|e| tracing::debug!("Ignoring invalid session cookie: {}", e))
            .ok()
    });

    let mut session = Session::default();
    if let Some(claims) = &claims {
        match state.store.find_by_id(&claims.sub).await? {
            Some(user) => session = Session::authenticated(user.into()),
            None => tracing::warn!("Session references unknown user {}", claims.sub),
        }
    }

    let refresh = claims.filter(|c| session.is_authenticated() && jwt::should_refresh(c));
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;

    if let Some(claims) = refresh {
        if !response.headers().contains_key(header::SET_COOKIE) {
            match establish(config, &claims.sub) {
                Ok(cookie) => {
                    if let Ok(value) = HeaderValue::from_str(&cookie) {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                }
                Err(e) => tracing::error!("Failed to refresh session: {}", e),
            }
        }
    }

    Ok(response)
}
