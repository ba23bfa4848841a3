//! Authentication HTTP handlers.
//!
//! Every handler produces exactly one response on every path; strategy and
//! store failures go through [`ApiError`].

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use shared_types::{LoginRequest, MessageResponse, SignupRequest};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonOrForm;

use super::local::LocalStrategy;
use super::session::{self, OAUTH_STATE_COOKIE};
use super::types::{AuthOutcome, StrategyError};
use super::google;

/// 302 to `location`, appending one `Set-Cookie` header per cookie.
fn redirect_found(location: &str, cookies: Vec<String>) -> Response {
    let mut headers: Vec<(HeaderName, String)> = vec![(header::LOCATION, location.to_string())];
    headers.extend(cookies.into_iter().map(|c| (header::SET_COOKIE, c)));

    (StatusCode::FOUND, AppendHeaders(headers)).into_response()
}

/// Create a local account and send the browser to the login page.
///
/// Does not log the new user in.
pub async fn signup(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<SignupRequest>,
) -> ApiResult<Response> {
    request.validate().map_err(ApiError::BadRequest)?;

    let user = LocalStrategy::new(state.store.as_ref())
        .register(request)
        .await?;
    tracing::info!("Registered local user {}", user.username);

    Ok(redirect_found(&state.redirects.login_url, Vec::new()))
}

/// Verify local credentials and establish a session.
///
/// Rejected credentials answer 401 with `{ "message": <reason> }` and no
/// cookie.
pub async fn login(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = LocalStrategy::new(state.store.as_ref())
        .authenticate(&request.username, &request.password)
        .await?;

    match outcome {
        AuthOutcome::Rejected(info) => {
            tracing::info!("Login rejected for {}: {}", request.username, info);
            Ok((StatusCode::UNAUTHORIZED, Json(MessageResponse::new(info))).into_response())
        }
        AuthOutcome::Authenticated(user) => {
            let cookie = session::establish(&state.session, &user.id)?;
            tracing::info!("Successful login for: {}", user.username);
            Ok(redirect_found(&state.redirects.app_url, vec![cookie]))
        }
    }
}

/// Logout - clear the session cookie. Succeeds with or without a session.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, session::clear(&state.session))],
        Json(MessageResponse::logout_success()),
    )
}

/// Start Google OAuth login flow by redirecting to the consent screen.
pub async fn google_start(State(state): State<AppState>) -> ApiResult<Response> {
    let provider = state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::Config("Google login is not configured".to_string()))?;

    let csrf_state = uuid::Uuid::new_v4().to_string();
    let auth_url = provider.authorization_url(&csrf_state);

    Ok(redirect_found(
        &auth_url,
        vec![session::oauth_state_cookie(&state.session, &csrf_state)],
    ))
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Why a callback did not produce a session.
enum CallbackFailure {
    /// The provider or the browser refused the login; sent back to the login page.
    Refused(String),
    /// Store or signing failure; answered through [`ApiError`].
    Error(ApiError),
}

impl From<StrategyError> for CallbackFailure {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::Provider(reason) => CallbackFailure::Refused(reason),
            other => CallbackFailure::Error(other.into()),
        }
    }
}

/// Handle Google OAuth callback.
///
/// Success establishes a session and redirects to the app; a provider
/// error, missing code, state mismatch or failed exchange redirects to the
/// login page without a session. Store failures answer through [`ApiError`].
/// The state cookie is cleared either way.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    let clear_state = session::clear_oauth_state_cookie(&state.session);

    match handle_callback_inner(&state, &headers, params).await {
        Ok(session_cookie) => redirect_found(
            &state.redirects.app_url,
            vec![session_cookie, clear_state],
        ),
        Err(CallbackFailure::Refused(reason)) => {
            tracing::warn!("Google login failed: {}", reason);
            redirect_found(&state.redirects.login_url, vec![clear_state])
        }
        Err(CallbackFailure::Error(err)) => {
            let mut response = err.into_response();
            if let Ok(value) = HeaderValue::from_str(&clear_state) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
    }
}

/// Returns the session `Set-Cookie` value.
async fn handle_callback_inner(
    state: &AppState,
    headers: &HeaderMap,
    params: AuthCallbackParams,
) -> Result<String, CallbackFailure> {
    if let Some(error) = params.error {
        return Err(CallbackFailure::Refused(format!(
            "provider returned error '{}'",
            error
        )));
    }

    let provider = state.google.as_ref().ok_or_else(|| {
        CallbackFailure::Refused("Google login is not configured".to_string())
    })?;

    let code = params
        .code
        .ok_or_else(|| CallbackFailure::Refused("missing authorization code".to_string()))?;

    let expected = session::read_cookie(headers, OAUTH_STATE_COOKIE);
    match (expected, params.state) {
        (Some(expected), Some(received)) if !expected.is_empty() && expected == received => {}
        _ => {
            return Err(CallbackFailure::Refused(
                "state parameter mismatch".to_string(),
            ))
        }
    }

    let user = google::authenticate(state.store.as_ref(), provider.as_ref(), &code).await?;

    tracing::info!("Successful Google login for: {}", user.username);
    session::establish(&state.session, &user.id).map_err(|e| CallbackFailure::Error(e.into()))
}
