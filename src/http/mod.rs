//! HTTP surface: router, middleware stack and server.
//!
//! Every request passes the general admission filter. Login and
//! registration additionally pass the stricter auth filter, protected routes
//! the authentication gate, and admin routes the admin check.

mod admission;
mod gate;
mod handlers;
mod rejection;
mod server;

pub use admission::{admit, client_id};
pub use gate::{authenticate, require_admin, IS_ADMIN_HEADER, USERNAME_HEADER, USER_ID_HEADER};
pub use rejection::{ErrorBody, Rejection};
pub use server::HttpServer;

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::accounts::AccountStore;
use crate::config::{CorsConfig, RateLimitingConfig};
use crate::credential::CredentialCodec;
use crate::links::LinkStore;
use crate::ratelimit::{Clock, SweepHandle, VisitorRegistry};

const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared state handed to the handlers.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<CredentialCodec>,
    pub accounts: Arc<dyn AccountStore>,
    pub links: Arc<dyn LinkStore>,
}

/// One visitor registry per route class.
pub struct RouteLimiters {
    pub general: Arc<VisitorRegistry>,
    pub auth: Arc<VisitorRegistry>,
}

impl RouteLimiters {
    pub fn new(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            general: Arc::new(VisitorRegistry::new(config.general.clone(), clock.clone())),
            auth: Arc::new(VisitorRegistry::new(config.auth.clone(), clock)),
        }
    }

    /// Start the idle-visitor sweeper of every registry.
    pub fn spawn_sweepers(&self) -> Vec<SweepHandle> {
        vec![self.general.spawn_sweeper(), self.auth.spawn_sweeper()]
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(CORS_MAX_AGE)
}

/// Build the application router with its full middleware stack.
pub fn router(state: AppState, limiters: &RouteLimiters, cors: &CorsConfig) -> Router {
    let auth_routes = Router::new()
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(
            limiters.auth.clone(),
            admission::admit,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/users", get(handlers::admin_users))
        .route("/api/admin/links", get(handlers::admin_links))
        .route("/api/admin/links/:id", delete(handlers::admin_delete_link))
        .route("/api/admin/users/:id", delete(handlers::admin_delete_user))
        .route("/api/admin/users/:id/admin", put(handlers::admin_set_user_admin))
        .route_layer(middleware::from_fn(gate::require_admin));

    // Layers added later run first: authenticate wraps require_admin.
    let protected_routes = Router::new()
        .route("/api/me", get(handlers::me))
        .route(
            "/api/links",
            get(handlers::list_links).post(handlers::create_link),
        )
        .route("/api/links/:id", delete(handlers::delete_link))
        .route("/api/links/:id/privacy", put(handlers::set_link_visibility))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.codec.clone(),
            gate::authenticate,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/public-links", get(handlers::public_links))
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            limiters.general.clone(),
            admission::admit,
        ))
        .layer(cors_layer(cors))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{MemoryAccountStore, PasswordHasher};
    use crate::config::RouteLimitConfig;
    use crate::links::MemoryLinkStore;
    use crate::ratelimit::ManualClock;
    use axum::body::{to_bytes, Body};
    use axum::extract::Request;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        accounts: Arc<MemoryAccountStore>,
    }

    fn limits(capacity: u64) -> RouteLimitConfig {
        RouteLimitConfig {
            capacity,
            refill_per_second: 1,
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }

    fn test_app_with(general: RouteLimitConfig) -> TestApp {
        let accounts = Arc::new(MemoryAccountStore::new(
            PasswordHasher::with_params(8, 1, 1).unwrap(),
        ));
        let state = AppState {
            codec: Arc::new(CredentialCodec::new("router-test-secret").unwrap()),
            accounts: accounts.clone(),
            links: Arc::new(MemoryLinkStore::new()),
        };
        let limiters = RouteLimiters::new(
            &RateLimitingConfig {
                general,
                auth: RouteLimitConfig::auth(),
            },
            Arc::new(ManualClock::new()),
        );
        TestApp {
            router: router(state, &limiters, &CorsConfig::default()),
            accounts,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(limits(1000))
    }

    struct Call<'a> {
        method: Method,
        uri: &'a str,
        client: &'a str,
        token: Option<&'a str>,
        body: Option<Value>,
    }

    impl<'a> Call<'a> {
        fn new(method: Method, uri: &'a str) -> Self {
            Self {
                method,
                uri,
                client: "203.0.113.1",
                token: None,
                body: None,
            }
        }

        fn from_client(mut self, client: &'a str) -> Self {
            self.client = client;
            self
        }

        fn token(mut self, token: &'a str) -> Self {
            self.token = Some(token);
            self
        }

        fn json(mut self, body: Value) -> Self {
            self.body = Some(body);
            self
        }

        fn build(self) -> Request {
            let mut builder = Request::builder()
                .method(self.method)
                .uri(self.uri)
                .header("x-forwarded-for", self.client);
            if let Some(token) = self.token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            match self.body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            }
        }
    }

    async fn send(app: &TestApp, call: Call<'_>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(call.build()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn register(app: &TestApp, username: &str) -> String {
        let (status, body) = send(
            app,
            Call::new(Method::POST, "/api/register")
                .from_client(username)
                .json(json!({"username": username, "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_carries_security_headers() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(Call::new(Method::GET, "/health").build())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let app = test_app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/links")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:8080"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = test_app();
        let token = register(&app, "alice").await;

        let (status, body) = send(&app, Call::new(Method::GET, "/api/me").token(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["is_admin"], false);

        let (status, body) = send(
            &app,
            Call::new(Method::POST, "/api/login")
                .json(json!({"username": " alice ", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], 1);
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let app = test_app();

        let (status, body) = send(
            &app,
            Call::new(Method::POST, "/api/register")
                .json(json!({"username": "al", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");

        let (status, _) = send(
            &app,
            Call::new(Method::POST, "/api/register")
                .json(json!({"username": "alice", "password": "onlyletters"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        register(&app, "alice").await;
        let (status, body) = send(
            &app,
            Call::new(Method::POST, "/api/register")
                .json(json!({"username": "alice", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Username already exists");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = test_app();

        let (status, body) = send(&app, Call::new(Method::GET, "/api/links")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authorization header required");

        let (status, body) =
            send(&app, Call::new(Method::GET, "/api/links").token("not.a.token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_links_are_scoped_to_owner() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;

        let (status, link) = send(
            &app,
            Call::new(Method::POST, "/api/links")
                .token(&alice)
                .json(json!({"url": "https://example.com", "is_public": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(link["title"], "https://example.com");

        let (_, listed) = send(&app, Call::new(Method::GET, "/api/links").token(&bob)).await;
        assert_eq!(listed, json!([]));

        let (_, public) = send(&app, Call::new(Method::GET, "/api/public-links")).await;
        assert_eq!(public.as_array().map(Vec::len), Some(1));

        let uri = format!("/api/links/{}", link["id"]);
        let (status, _) = send(&app, Call::new(Method::DELETE, &uri).token(&bob)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Call::new(Method::DELETE, &uri).token(&alice)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            Call::new(Method::POST, "/api/links")
                .token(&alice)
                .json(json!({"url": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let app = test_app();
        let user = register(&app, "alice").await;

        let (status, body) =
            send(&app, Call::new(Method::GET, "/api/admin/users").token(&user)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");

        let (status, _) = send(&app, Call::new(Method::GET, "/api/admin/users")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        app.accounts.create("root", "secret123", true).await.unwrap();
        let (_, login) = send(
            &app,
            Call::new(Method::POST, "/api/login")
                .json(json!({"username": "root", "password": "secret123"})),
        )
        .await;
        let admin = login["token"].as_str().unwrap();

        let (status, users) =
            send(&app, Call::new(Method::GET, "/api/admin/users").token(admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().map(Vec::len), Some(2));

        let (status, _) =
            send(&app, Call::new(Method::DELETE, "/api/admin/links/42").token(admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn admin_token(app: &TestApp) -> String {
        app.accounts.create("root", "secret123", true).await.unwrap();
        let (_, login) = send(
            app,
            Call::new(Method::POST, "/api/login")
                .from_client("root")
                .json(json!({"username": "root", "password": "secret123"})),
        )
        .await;
        login["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admin_grants_and_revokes_admin_flag() {
        let app = test_app();
        let user = register(&app, "alice").await;
        let admin = admin_token(&app).await;

        let (status, body) = send(
            &app,
            Call::new(Method::PUT, "/api/admin/users/1/admin")
                .token(&user)
                .json(json!({"is_admin": true})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");

        let (status, body) = send(
            &app,
            Call::new(Method::PUT, "/api/admin/users/1/admin")
                .token(&admin)
                .json(json!({"is_admin": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_admin"], true);

        // A fresh login carries the new flag
        let (_, login) = send(
            &app,
            Call::new(Method::POST, "/api/login")
                .from_client("alice")
                .json(json!({"username": "alice", "password": "secret123"})),
        )
        .await;
        let promoted = login["token"].as_str().unwrap();
        let (status, _) =
            send(&app, Call::new(Method::GET, "/api/admin/users").token(promoted)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Call::new(Method::PUT, "/api/admin/users/2/admin")
                .token(&admin)
                .json(json!({"is_admin": false})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Cannot modify own admin status");

        let (status, _) = send(
            &app,
            Call::new(Method::PUT, "/api/admin/users/99/admin")
                .token(&admin)
                .json(json!({"is_admin": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_deletes_user_and_their_links() {
        let app = test_app();
        let user = register(&app, "alice").await;
        let admin = admin_token(&app).await;

        send(
            &app,
            Call::new(Method::POST, "/api/links")
                .token(&user)
                .json(json!({"url": "https://example.com", "is_public": true})),
        )
        .await;

        let (status, body) =
            send(&app, Call::new(Method::DELETE, "/api/admin/users/2").token(&admin)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Cannot delete own account");

        let (status, _) =
            send(&app, Call::new(Method::DELETE, "/api/admin/users/1").token(&admin)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, users) = send(&app, Call::new(Method::GET, "/api/admin/users").token(&admin)).await;
        assert_eq!(users.as_array().map(Vec::len), Some(1));
        let (_, links) = send(&app, Call::new(Method::GET, "/api/admin/links").token(&admin)).await;
        assert_eq!(links, json!([]));

        let (status, _) =
            send(&app, Call::new(Method::DELETE, "/api/admin/users/1").token(&admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_owner_changes_link_visibility() {
        let app = test_app();
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;

        let (_, link) = send(
            &app,
            Call::new(Method::POST, "/api/links")
                .token(&alice)
                .json(json!({"url": "https://example.com"})),
        )
        .await;
        assert_eq!(link["is_public"], false);
        let uri = format!("/api/links/{}/privacy", link["id"]);

        let (status, _) = send(
            &app,
            Call::new(Method::PUT, &uri)
                .token(&bob)
                .json(json!({"is_public": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = send(
            &app,
            Call::new(Method::PUT, &uri)
                .token(&alice)
                .json(json!({"is_public": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["is_public"], true);

        let (_, public) = send(&app, Call::new(Method::GET, "/api/public-links")).await;
        assert_eq!(public.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_sixth_login_attempt_is_rate_limited() {
        let app = test_app();
        let attempt = |client: &'static str| {
            Call::new(Method::POST, "/api/login")
                .from_client(client)
                .json(json!({"username": "ghost", "password": "wrong1"}))
        };

        for _ in 0..5 {
            let (status, _) = send(&app, attempt("198.51.100.1")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, body) = send(&app, attempt("198.51.100.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded. Please try again later.");
        assert_eq!(body["code"], "rate_limited");

        let (status, _) = send(&app, attempt("198.51.100.2")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Call::new(Method::GET, "/health").from_client("198.51.100.1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_general_limit_applies_to_every_route() {
        let app = test_app_with(limits(3));

        for _ in 0..3 {
            let (status, _) = send(&app, Call::new(Method::GET, "/health")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = send(&app, Call::new(Method::GET, "/api/public-links")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send(&app, Call::new(Method::GET, "/health").from_client("192.0.2.50")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
