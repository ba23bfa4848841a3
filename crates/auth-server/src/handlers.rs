use axum::{http::StatusCode, Extension};

use crate::auth::session::Session;

/// Body of the authenticated health check at `/`.
pub const RUNNING: &str = "server is running!";

/// `GET /`, behind `require_auth`.
pub async fn root(Extension(session): Extension<Session>) -> &'static str {
    if let Some(user) = session.user() {
        tracing::debug!(
            user_id = %user.id,
            provider = user.provider.as_str(),
            "Health check by {}",
            user.display_name.as_deref().unwrap_or(&user.username)
        );
    }
    RUNNING
}

/// `GET /health`, no session needed.
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}
