pub mod cors;
pub mod error;
mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;

use std::time::Duration;

use crate::config::{DEFAULT_BODY_TIMEOUT, DEFAULT_MAX_BODY_BYTES};
use crate::session::SessionRegistry;
use crate::sink::LogSink;

use handlers::*;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub sink: LogSink,
    /// Port the listener is actually bound to, reported by the status route.
    pub port: u16,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, port: u16) -> Self {
        Self {
            sessions,
            sink: LogSink::new(),
            port,
        }
    }
}

/// Request-level limits applied by the router.
///
/// Use `RouterConfig::default()` in tests.
pub struct RouterConfig {
    /// Maximum time a client may take to deliver a request body.
    pub body_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            body_timeout: DEFAULT_BODY_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

pub fn router(state: AppState, config: RouterConfig) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/session", post(session_create))
        .route("/log", post(log_append))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(RequestBodyTimeoutLayer::new(config.body_timeout))
        .layer(middleware::from_fn(cors::preflight))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(cors::ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(cors::ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(cors::ALLOW_HEADERS),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // for oneshot()

    /// Creates a router over a fresh debug directory. The `TempDir` must be
    /// kept alive for the duration of the test.
    fn create_test_app() -> (Router, AppState, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::new(SessionRegistry::new(dir.path()), 8787);
        (router(state.clone(), RouterConfig::default()), state, dir)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _state, _dir) = create_test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_sessions() {
        let (app, state, dir) = create_test_app();
        let session = state.sessions.create(Some("one".into())).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "running");
        assert_eq!(json["port"], 8787);
        assert_eq!(json["debug_dir"], dir.path().display().to_string());
        assert_eq!(json["active_sessions"], serde_json::json!([session.id]));
    }

    #[tokio::test]
    async fn create_session_returns_id_and_file() {
        let (app, _state, dir) = create_test_app();
        let response = app
            .oneshot(post("/session", r#"{"name":"Auth Bug"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let id = json["session_id"].as_str().unwrap();
        assert!(id.starts_with("auth-bug-"));
        let log_file = json["log_file"].as_str().unwrap();
        assert_eq!(
            log_file,
            dir.path().join(format!("debug-{id}.log")).display().to_string()
        );
        assert_eq!(std::fs::metadata(log_file).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn create_session_empty_body_uses_default_name() {
        let (app, _state, _dir) = create_test_app();
        let response = app.oneshot(post("/session", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["session_id"].as_str().unwrap().starts_with("debug-"));
    }

    #[tokio::test]
    async fn append_log_writes_record() {
        let (app, state, _dir) = create_test_app();
        let session = state.sessions.create(Some("Auth Bug".into())).await.unwrap();
        let body = serde_json::json!({
            "sessionId": session.id,
            "msg": "token expired",
            "hypothesisId": "h1",
        });

        let response = app
            .oneshot(post("/log", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"ok": true}));

        let contents = std::fs::read_to_string(&session.log_file).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains(r#""msg":"token expired""#));
        assert!(contents.contains(r#""hypothesisId":"h1""#));
    }

    #[tokio::test]
    async fn append_log_without_session_id_is_rejected() {
        let (app, _state, dir) = create_test_app();
        let response = app
            .oneshot(post("/log", r#"{"msg":"orphan"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "session_id_required");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_route_is_structured_404() {
        let (app, _state, _dir) = create_test_app();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn wrong_method_is_structured_404() {
        let (app, _state, _dir) = create_test_app();
        let response = app
            .oneshot(Request::builder().uri("/log").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn preflight_is_empty_204_with_cors_headers() {
        let (app, _state, _dir) = create_test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/log")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn errors_carry_cors_headers() {
        let (app, _state, _dir) = create_test_app();
        let response = app.oneshot(post("/log", "{")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::new(SessionRegistry::new(dir.path()), 0);
        let app = router(
            state,
            RouterConfig {
                max_body_bytes: 64,
                ..Default::default()
            },
        );
        let big = format!(r#"{{"sessionId":"a-1","msg":"{}"}}"#, "x".repeat(1024));
        let response = app.oneshot(post("/log", &big)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"]["code"], "payload_too_large");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
