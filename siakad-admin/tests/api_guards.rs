//! Router-level behaviour that is decided before any query runs: session
//! guards, the admin page gate, request validation, the login rate limit,
//! uploads and health. The pool points at a closed port so nothing here
//! needs a database.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use tower::ServiceExt;

use siakad_admin::config::AppConfig;
use siakad_admin::routes::rate_limit::LoginRateLimit;
use siakad_admin::services::rate_limiter::{MemoryRateLimiter, SlidingWindow};
use siakad_admin::{build_router, AppState};
use siakad_shared::middleware::sign_session;
use siakad_shared::types::session::{session_secret, SessionClaims, SESSION_COOKIE};

const BOUNDARY: &str = "siakad-test-boundary";

fn offline_pool() -> Pool<ConnectionManager<PgConnection>> {
    Pool::builder()
        .max_size(1)
        .min_idle(Some(0))
        .connection_timeout(Duration::from_millis(100))
        .build_unchecked(ConnectionManager::new("postgres://siakad@127.0.0.1:1/siakad"))
}

fn app_with(config: AppConfig) -> Router {
    let policy = SlidingWindow::new(config.login_rate_limit, config.login_rate_window_secs);
    let login_limiter =
        LoginRateLimit::new(Arc::new(MemoryRateLimiter::new(policy)), config.trust_proxy_headers);
    let state = Arc::new(AppState {
        db: offline_pool(),
        config,
        login_limiter,
        metrics_handle: None,
    });
    build_router(state).unwrap()
}

fn app() -> Router {
    app_with(AppConfig::default())
}

fn cookie(role: &str) -> String {
    let claims = SessionClaims::new(1, "Bu Ratna", "ratna@sekolah.id", role, 3600);
    let token = sign_session(&claims, &session_secret()).unwrap();
    format!("{SESSION_COOKIE}={token}")
}

fn json_request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

fn multipart_body(content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"foto\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(content_type: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/upload/avatar")
        .header(header::COOKIE, cookie("operator"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(content_type, bytes)))
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn temp_avatar_dir() -> PathBuf {
    std::env::temp_dir().join(format!("siakad-upload-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn api_requires_a_session() {
    let response = app()
        .oneshot(Request::get("/api/students").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "E0004");
}

#[tokio::test]
async fn tampered_session_is_rejected() {
    let response = app()
        .oneshot(
            Request::get("/api/auth/me")
                .header(header::COOKIE, format!("{}x", cookie("admin")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_the_session_identity() {
    let response = app()
        .oneshot(
            Request::get("/api/auth/me")
                .header(header::COOKIE, cookie("operator"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["name"], "Bu Ratna");
    assert_eq!(body["data"]["role"], "operator");
}

#[tokio::test]
async fn operators_cannot_manage_roles_or_users() {
    let app = app();
    for uri in ["/api/roles", "/api/users"] {
        let response = app
            .clone()
            .oneshot(
                Request::get(uri)
                    .header(header::COOKIE, cookie("operator"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body_json(response).await["error"]["code"], "E0005");
    }
}

#[tokio::test]
async fn admin_pages_redirect_to_login() {
    let response = app()
        .oneshot(Request::get("/admin/students?page=2").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/login?redirect=%2Fadmin%2Fstudents%3Fpage%3D2"
    );
}

#[tokio::test]
async fn incomplete_generate_request_is_rejected_before_the_database() {
    let response = app()
        .oneshot(
            json_request(Method::POST, "/api/spp/generate")
                .header(header::COOKIE, cookie("operator"))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "E0002");
}

#[tokio::test]
async fn negative_amount_is_rejected() {
    let payload = r#"{"student_id":1,"month_count":2,"paid_at":"2024-07-15","amount":-1}"#;
    let response = app()
        .oneshot(
            json_request(Method::POST, "/api/spp/generate")
                .header(header::COOKIE, cookie("operator"))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_is_rate_limited_per_client_ip() {
    let app = app_with(AppConfig {
        trust_proxy_headers: true,
        ..AppConfig::default()
    });
    let attempt = |ip: &'static str| {
        json_request(Method::POST, "/api/auth/login")
            .header("x-forwarded-for", ip)
            .body(Body::from("{}"))
            .unwrap()
    };

    for expected_remaining in (0..5).rev() {
        let response = app.clone().oneshot(attempt("203.0.113.7")).await.unwrap();
        // Empty credentials are rejected by the handler, the attempt still counts.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            expected_remaining.to_string().as_str()
        );
    }

    let response = app.clone().oneshot(attempt("203.0.113.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(body_json(response).await["error"]["code"], "E0006");

    let other = app.oneshot(attempt("198.51.100.20")).await.unwrap();
    assert_eq!(other.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forwarded_for_is_ignored_without_trusted_proxy() {
    let app = app();
    let attempt = |n: u8| {
        let mut req = json_request(Method::POST, "/api/auth/login")
            .header("x-forwarded-for", format!("10.1.1.{n}"))
            .body(Body::from("{}"))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 51000))));
        req
    };

    for n in 1..=5 {
        let response = app.clone().oneshot(attempt(n)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    let response = app.oneshot(attempt(6)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn upload_rejects_unsupported_image_types() {
    let response = app()
        .oneshot(upload_request("image/gif", b"GIF89a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "E6002");
}

#[tokio::test]
async fn upload_rejects_oversized_images() {
    let config = AppConfig {
        avatar_dir: temp_avatar_dir().to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    let oversized = vec![0u8; config.avatar_max_bytes + 128 * 1024];

    let response = app_with(config)
        .oneshot(upload_request("image/png", &oversized))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn upload_stores_avatar_under_public_url() {
    let dir = temp_avatar_dir();
    let config = AppConfig {
        avatar_dir: dir.to_string_lossy().into_owned(),
        ..AppConfig::default()
    };

    let response = app_with(config)
        .oneshot(upload_request("image/png", b"\x89PNG\r\n\x1a\nfake"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let url = body["data"]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/avatars/avatar-"));
    assert!(url.ends_with(".png"));

    let file_name = url.trim_start_matches("/avatars/");
    assert!(dir.join(file_name).exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn health_reports_degraded_without_database() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["service"], "siakad-admin");
    assert_eq!(body["checks"][0]["name"], "database");
}

#[tokio::test]
async fn metrics_are_absent_without_exporter() {
    let response = app()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
