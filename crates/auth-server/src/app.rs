//! Application state and the request pipeline.
//!
//! Stages, outermost first:
//!
//! 1. **trace** (`TraceLayer`): logs every request and response.
//! 2. **cors** (`CorsLayer`): allows credentialed requests from the one
//!    configured origin and answers preflights before anything else runs.
//! 3. **static** (`/static`), `/health` and `/logout`: mounted outside the
//!    session stage, so they answer without touching the user store.
//! 4. **session** ([`auth::load_session`]): post-condition: every request
//!    carries a `Session` extension, authenticated or anonymous.
//! 5. **gate** ([`auth::require_auth`] / [`auth::require_anonymous`]):
//!    per-route, requires stage 4; short-circuits without running the handler.
//! 6. **handler**: body extraction happens here, after the gates.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{self, google::IdentityProvider, types::SessionConfig};
use crate::config::RedirectSettings;
use crate::handlers;
use crate::repository::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub session: SessionConfig,
    pub redirects: RedirectSettings,
    /// `None` when Google OAuth is not configured
    pub google: Option<Arc<dyn IdentityProvider>>,
}

pub fn build_app(state: AppState, origin: &str, static_dir: &str) -> anyhow::Result<Router> {
    let authenticated = Router::new()
        .route("/", get(handlers::root))
        .route_layer(middleware::from_fn(auth::require_auth));

    let anonymous_only = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_anonymous,
        ));

    let open = Router::new()
        .route("/auth/google", get(auth::google_start))
        .route("/auth/google/callback", get(auth::google_callback));

    let sessionless = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/logout", post(auth::logout));

    let app = Router::new()
        .merge(authenticated)
        .merge(anonymous_only)
        .merge(open)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::load_session,
        ))
        .merge(sessionless)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(build_cors_layer(origin)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Build CORS layer for the single configured origin, with credentials.
fn build_cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = origin
        .trim()
        .parse()
        .with_context(|| format!("ORIGIN is not a valid header value: {}", origin))?;

    tracing::info!("CORS configured for origin: {:?}", origin);
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::google::fake::{FakeProvider, GOOD_CODE};
    use crate::auth::jwt;
    use crate::auth::session::OAUTH_STATE_COOKIE;
    use crate::handlers::RUNNING;
    use crate::repository::memory::{MemoryUserStore, UnavailableUserStore};
    use axum::{
        body::Body,
        http::{Request, Response, StatusCode},
    };
    use chrono::{Duration, Utc};
    use cookie::Cookie;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const APP_URL: &str = "http://localhost:3000";
    const LOGIN_URL: &str = "http://localhost:3000/login";
    const SECRET: &str = "test-secret-key-for-testing-only";

    struct TestApp {
        router: Router,
        store: Arc<MemoryUserStore>,
        session: SessionConfig,
    }

    fn router_with_store(store: Arc<dyn UserStore>, session: SessionConfig) -> Router {
        let state = AppState {
            store,
            session,
            redirects: RedirectSettings {
                app_url: APP_URL.to_string(),
                login_url: LOGIN_URL.to_string(),
            },
            google: Some(Arc::new(FakeProvider::default())),
        };
        build_app(state, APP_URL, "public").unwrap()
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemoryUserStore::default());
        let session = SessionConfig::new(SECRET, false);
        let router = router_with_store(store.clone(), session.clone());
        TestApp {
            router,
            store,
            session,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// Sign up and log in, returning the `name=value` session cookie pair.
        async fn logged_in(&self, username: &str, password: &str) -> String {
            let body = format!(r#"{{"username":"{}","password":"{}"}}"#, username, password);
            let signup = self.send(json_post("/signup", &body, None)).await;
            assert_eq!(signup.status(), StatusCode::FOUND);

            let login = self.send(json_post("/login", &body, None)).await;
            assert_eq!(login.status(), StatusCode::FOUND);
            session_cookie(&login).expect("login sets a session cookie")
        }
    }

    fn json_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<Cookie<'static>> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    /// The non-empty `OAuth=...` pair from a response, if any.
    fn session_cookie(response: &Response<Body>) -> Option<String> {
        set_cookies(response)
            .into_iter()
            .find(|c| c.name() == "OAuth" && !c.value().is_empty())
            .map(|c| format!("{}={}", c.name(), c.value()))
    }

    fn location(response: &Response<Body>) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_root_requires_session() {
        let app = test_app();

        let response = app.send(get_request("/", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(body_string(response).await, RUNNING);

        let response = app.send(get_request("/", Some("OAuth=not-a-token"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = test_app();
        let response = app.send(get_request("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signup_creates_one_user_without_session() {
        let app = test_app();

        let response = app
            .send(json_post("/signup", r#"{"username":"a","password":"b"}"#, None))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), LOGIN_URL);
        assert!(session_cookie(&response).is_none());
        assert_eq!(app.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_signup_accepts_form_body() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=dana&password=pw&display_name=Dana"))
            .unwrap();

        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_signup_failures_always_respond() {
        let app = test_app();
        let body = r#"{"username":"a","password":"b"}"#;
        app.send(json_post("/signup", body, None)).await;

        let duplicate = app.send(json_post("/signup", body, None)).await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let invalid = app
            .send(json_post("/signup", r#"{"username":"","password":"b"}"#, None))
            .await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(invalid).await["error"], "username is required");

        let malformed = app.send(json_post("/signup", "{", None)).await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        assert_eq!(app.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_issues_fourteen_day_session() {
        let app = test_app();
        app.send(json_post("/signup", r#"{"username":"a","password":"b"}"#, None))
            .await;

        let response = app
            .send(json_post("/login", r#"{"username":"a","password":"b"}"#, None))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), APP_URL);

        let cookie = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == "OAuth")
            .expect("session cookie");
        assert_eq!(
            cookie.max_age(),
            Some(cookie::time::Duration::seconds(1_209_600))
        );

        let claims = jwt::validate_token(&app.session, cookie.value()).unwrap();
        assert!(claims.exp <= (Utc::now() + Duration::days(14)).timestamp());
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let app = test_app();
        let cookie = app.logged_in("a", "b").await;

        let user = app.store.find_local("a").await.unwrap().unwrap();
        let token = cookie.trim_start_matches("OAuth=");
        assert_eq!(jwt::validate_token(&app.session, token).unwrap().sub, user.id);

        for _ in 0..2 {
            let response = app.send(get_request("/", Some(&cookie))).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(session_cookie(&response).is_none());
            assert_eq!(body_string(response).await, RUNNING);
        }
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let app = test_app();
        app.send(json_post("/signup", r#"{"username":"a","password":"b"}"#, None))
            .await;

        let wrong = app
            .send(json_post("/login", r#"{"username":"a","password":"x"}"#, None))
            .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert!(session_cookie(&wrong).is_none());
        assert_eq!(
            body_json(wrong).await,
            serde_json::json!({ "message": "bad password" })
        );

        let unknown = app
            .send(json_post("/login", r#"{"username":"zed","password":"b"}"#, None))
            .await;
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert!(session_cookie(&unknown).is_none());
        assert_eq!(body_json(unknown).await["message"], "no user found");
    }

    #[tokio::test]
    async fn test_anonymous_gate_blocks_logged_in_users() {
        let app = test_app();
        let cookie = app.logged_in("a", "b").await;

        let signup = app
            .send(json_post(
                "/signup",
                r#"{"username":"other","password":"b"}"#,
                Some(&cookie),
            ))
            .await;
        assert_eq!(signup.status(), StatusCode::FOUND);
        assert_eq!(location(&signup), APP_URL);
        assert_eq!(app.store.len().await, 1);

        // Wrong password would be a 401 if the handler ran.
        let login = app
            .send(json_post(
                "/login",
                r#"{"username":"a","password":"wrong"}"#,
                Some(&cookie),
            ))
            .await;
        assert_eq!(login.status(), StatusCode::FOUND);
        assert_eq!(location(&login), APP_URL);
        assert!(session_cookie(&login).is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_cookie_without_session() {
        let app = test_app();
        let response = app.send(json_post("/logout", "", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let cleared = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == "OAuth")
            .expect("clearing cookie");
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(cookie::time::Duration::ZERO));
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "message": "logout success" })
        );
    }

    #[tokio::test]
    async fn test_logout_with_session() {
        let app = test_app();
        let cookie = app.logged_in("a", "b").await;

        let response = app.send(json_post("/logout", "", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).is_none());
        assert_eq!(body_json(response).await["message"], "logout success");
    }

    #[tokio::test]
    async fn test_old_session_is_refreshed() {
        let app = test_app();
        app.logged_in("a", "b").await;
        let user = app.store.find_local("a").await.unwrap().unwrap();

        let old = jwt::create_token_at(&app.session, &user.id, Utc::now() - Duration::days(2))
            .unwrap();
        let response = app
            .send(get_request("/", Some(&format!("OAuth={}", old))))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let refreshed = session_cookie(&response).expect("refreshed cookie");
        let claims =
            jwt::validate_token(&app.session, refreshed.trim_start_matches("OAuth=")).unwrap();
        assert_eq!(claims.sub, user.id);
        assert!(claims.iat > Utc::now().timestamp() - 60);
    }

    #[tokio::test]
    async fn test_session_for_deleted_user_is_anonymous() {
        let app = test_app();
        let cookie = app.logged_in("a", "b").await;
        let user = app.store.find_local("a").await.unwrap().unwrap();
        app.store.remove(&user.id).await;

        let response = app.send(get_request("/", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_google_start_redirects_with_state() {
        let app = test_app();
        let response = app.send(get_request("/auth/google", None)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let state_cookie = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == OAUTH_STATE_COOKIE)
            .expect("state cookie");
        assert_eq!(
            location(&response),
            format!("https://consent.test/auth?state={}", state_cookie.value())
        );
    }

    #[tokio::test]
    async fn test_google_callback_error_redirects_to_failure() {
        let app = test_app();
        let response = app
            .send(get_request(
                "/auth/google/callback?error=access_denied&state=s1",
                Some("oauth_state=s1"),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), LOGIN_URL);
        assert!(session_cookie(&response).is_none());
        assert_eq!(app.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_google_callback_state_mismatch() {
        let app = test_app();
        let uri = format!("/auth/google/callback?code={}&state=forged", GOOD_CODE);

        let response = app.send(get_request(&uri, Some("oauth_state=s1"))).await;
        assert_eq!(location(&response), LOGIN_URL);
        assert!(session_cookie(&response).is_none());

        let response = app.send(get_request(&uri, None)).await;
        assert_eq!(location(&response), LOGIN_URL);
        assert_eq!(app.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_google_callback_success() {
        let app = test_app();
        let uri = format!("/auth/google/callback?code={}&state=s1", GOOD_CODE);

        let response = app.send(get_request(&uri, Some("oauth_state=s1"))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), APP_URL);
        let cookie = session_cookie(&response).expect("session cookie");
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.name() == OAUTH_STATE_COOKIE && c.value().is_empty()));

        let home = app.send(get_request("/", Some(&cookie))).await;
        assert_eq!(home.status(), StatusCode::OK);

        // Second login reuses the same record.
        app.send(get_request(&uri, Some("oauth_state=s1"))).await;
        assert_eq!(app.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_google_exchange_failure_redirects_to_failure() {
        let app = test_app();
        let response = app
            .send(get_request(
                "/auth/google/callback?code=expired&state=s1",
                Some("oauth_state=s1"),
            ))
            .await;

        assert_eq!(location(&response), LOGIN_URL);
        assert!(session_cookie(&response).is_none());
    }

    #[tokio::test]
    async fn test_google_callback_without_code_redirects_to_failure() {
        let app = test_app();
        let response = app
            .send(get_request(
                "/auth/google/callback?state=s1",
                Some("oauth_state=s1"),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), LOGIN_URL);
        assert!(session_cookie(&response).is_none());
        assert_eq!(app.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_google_callback_store_failure_is_server_error() {
        let router = router_with_store(
            Arc::new(UnavailableUserStore),
            SessionConfig::new(SECRET, false),
        );
        let uri = format!("/auth/google/callback?code={}&state=s1", GOOD_CODE);

        let response = router
            .oneshot(get_request(&uri, Some("oauth_state=s1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert!(session_cookie(&response).is_none());
        assert_eq!(
            body_json(response).await["error"],
            "Database operation failed"
        );
    }

    #[tokio::test]
    async fn test_logout_and_health_work_while_store_is_down() {
        let session = SessionConfig::new(SECRET, false);
        let router = router_with_store(Arc::new(UnavailableUserStore), session.clone());
        let token = jwt::create_token(&session, "user-1").unwrap();
        let cookie = format!("OAuth={}", token);

        let response = router
            .clone()
            .oneshot(json_post("/logout", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == "OAuth")
            .expect("clearing cookie");
        assert_eq!(cleared.value(), "");
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "message": "logout success" })
        );

        let health = router
            .clone()
            .oneshot(get_request("/health", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        // Routes that need the user still surface the outage.
        let root = router
            .oneshot(get_request("/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(root.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_login_accepts_form_body() {
        let app = test_app();
        app.send(json_post("/signup", r#"{"username":"erin","password":"pw"}"#, None))
            .await;

        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=erin&password=pw"))
            .unwrap();
        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), APP_URL);
        assert!(session_cookie(&response).is_some());
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_with_credentials() {
        let app = test_app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/login")
            .header(header::ORIGIN, APP_URL)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], APP_URL);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        assert!(build_cors_layer("bad\norigin").is_err());
    }
}
