//! Route gates.
//!
//! Both gates read the [`Session`] inserted by the session stage and either
//! pass the request through or short-circuit without calling the handler.
//! They are applied with `route_layer`, so they only run for matched routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;

use super::session::Session;

/// `None` when the session stage did not run.
fn is_authenticated(request: &Request) -> Option<bool> {
    request
        .extensions()
        .get::<Session>()
        .map(Session::is_authenticated)
}

/// Gate for routes that need a logged-in user.
///
/// Pre: session stage ran. Fails with 401 JSON when the session is anonymous.
pub async fn require_auth(request: Request, next: Next) -> Response {
    match is_authenticated(&request) {
        Some(true) => next.run(request).await,
        Some(false) => ApiError::unauthorized("Authentication required").into_response(),
        None => {
            tracing::error!("require_auth ran before the session stage");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Gate for signup and login: only anonymous visitors get through.
///
/// Pre: session stage ran. Logged-in users are redirected (302) to the app.
pub async fn require_anonymous(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match is_authenticated(&request) {
        Some(false) => next.run(request).await,
        Some(true) => {
            tracing::debug!("Already logged in, skipping {}", request.uri());
            (
                StatusCode::FOUND,
                [(header::LOCATION, state.redirects.app_url.as_str())],
            )
                .into_response()
        }
        None => {
            tracing::error!("require_anonymous ran before the session stage");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
