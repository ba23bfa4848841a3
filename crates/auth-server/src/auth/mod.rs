//! Authentication: strategies, signed-cookie sessions and route gates.
//!
//! This module provides:
//! - local username/password and Google OAuth strategies
//! - JWT-signed session cookies and the session pipeline stage
//! - `require_auth` / `require_anonymous` gates for routes
//! - the signup, login, logout and OAuth handlers

pub mod google;
mod handlers;
pub mod jwt;
mod local;
mod middleware;
mod password;
pub mod session;
pub mod types;

pub use handlers::{google_callback, google_start, login, logout, signup};
pub use middleware::{require_anonymous, require_auth};
pub use session::load_session;
