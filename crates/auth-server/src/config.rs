//! Startup configuration.
//!
//! Two layers feed [`AppConfig`]:
//! - the typed config source (`config/default.toml` by default, overridable with
//!   `CONFIG_PATH`, then `APP__SECTION__KEY` env vars) for the listening port,
//!   static directory and redirect targets;
//! - plain environment variables (a `.env` file is loaded first) for the CORS
//!   origin and the secrets.

use anyhow::{Context, Result};
use config::{builder::DefaultState, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;

const DEFAULT_CONFIG_PATH: &str = "config/default";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
    /// Directory served under `/static`
    pub static_dir: String,
}

/// Where the browser is sent after auth flows finish.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectSettings {
    /// Landing page after a successful login
    pub app_url: String,
    /// Login page; target after signup and after a failed OAuth callback
    pub login_url: String,
}

#[derive(Debug, Clone)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub redirects: RedirectSettings,
    /// The single origin allowed to make credentialed CORS requests
    pub origin: String,
    pub cookie_key: String,
    pub mongo_uri: String,
    /// `None` disables the Google routes
    pub google: Option<GoogleSettings>,
    /// Mark cookies `Secure` (set when `RUST_ENV=production`)
    pub secure_cookies: bool,
}

impl AppConfig {
    /// Load configuration from the process environment and config file.
    pub fn load() -> Result<Self> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = defaults()?
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let (server, redirects) = typed_settings(builder)?;
        Self::from_lookup(server, redirects, |key| env::var(key).ok())
    }

    fn from_lookup(
        server: ServerSettings,
        redirects: RedirectSettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };

        let cookie_key = required("COOKIE_ENCRYPTION_KEY")?;
        if cookie_key.len() < 32 {
            tracing::warn!("COOKIE_ENCRYPTION_KEY is shorter than 32 bytes; use a longer secret");
        }

        let google = match (
            lookup("GOOGLE_CLIENT_ID"),
            lookup("GOOGLE_CLIENT_SECRET"),
            lookup("GOOGLE_CALLBACK_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => Some(GoogleSettings {
                client_id,
                client_secret,
                callback_url,
            }),
            _ => {
                tracing::warn!("Google OAuth settings incomplete, /auth/google is disabled");
                None
            }
        };

        Ok(Self {
            server,
            redirects,
            origin: required("ORIGIN")?,
            cookie_key,
            mongo_uri: required("MONGO_URI")?,
            google,
            secure_cookies: lookup("RUST_ENV").as_deref() == Some("production"),
        })
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = config::Config::builder()
        .set_default("server.port", 8080_i64)?
        .set_default("server.static_dir", "public")?
        .set_default("redirects.app_url", "http://localhost:3000")?
        .set_default("redirects.login_url", "http://localhost:3000/login")?;
    Ok(builder)
}

fn typed_settings(
    builder: ConfigBuilder<DefaultState>,
) -> Result<(ServerSettings, RedirectSettings)> {
    let settings = builder.build().context("Failed to build configuration")?;
    let server = settings
        .get::<ServerSettings>("server")
        .context("Invalid [server] configuration")?;
    let redirects = settings
        .get::<RedirectSettings>("redirects")
        .context("Invalid [redirects] configuration")?;
    Ok((server, redirects))
}
