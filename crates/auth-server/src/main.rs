mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod handlers;
mod models;
mod repository;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{build_app, AppState};
use crate::auth::google::{GoogleProvider, IdentityProvider};
use crate::auth::types::SessionConfig;
use crate::config::AppConfig;
use crate::db::MongoUserStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    // Refuse to serve without a database
    let store = MongoUserStore::connect(&config.mongo_uri).await?;

    let google = config.google.clone().map(|settings| {
        tracing::info!("Google OAuth enabled, callback {}", settings.callback_url);
        Arc::new(GoogleProvider::new(settings)) as Arc<dyn IdentityProvider>
    });

    let state = AppState {
        store: Arc::new(store),
        session: SessionConfig::new(config.cookie_key.clone(), config.secure_cookies),
        redirects: config.redirects.clone(),
        google,
    };

    let app = build_app(state, &config.origin, &config.server.static_dir)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Server is running on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
