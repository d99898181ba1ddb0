use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use siakad_shared::errors::{AppError, ErrorCode};

use crate::services::rate_limiter::{RateDecision, RateLimitStore};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Middleware state for the login route.
#[derive(Clone)]
pub struct LoginRateLimit {
    pub store: Arc<dyn RateLimitStore>,
    /// Read the client address from proxy headers instead of the socket.
    pub trust_proxy_headers: bool,
}

impl LoginRateLimit {
    pub fn new(store: Arc<dyn RateLimitStore>, trust_proxy_headers: bool) -> Self {
        Self { store, trust_proxy_headers }
    }
}

/// Client address used as the limiter key.
///
/// The socket address by default. With `trust_proxy_headers` the last
/// `X-Forwarded-For` hop (the one our proxy appended) wins, then `X-Real-IP`.
pub fn client_ip(req: &Request<Body>, trust_proxy_headers: bool) -> String {
    trust_proxy_headers
        .then(|| forwarded_ip(req.headers()))
        .flatten()
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let last_hop = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .last();
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    last_hop.or_else(real_ip).map(str::to_string)
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at_secs()));
}

/// Sliding-window limit on login attempts per client IP. Every attempt
/// counts, successful or not.
pub async fn login_rate_limit(
    State(limiter): State<LoginRateLimit>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req, limiter.trust_proxy_headers);
    let now_ms = Utc::now().timestamp_millis();

    let decision = match limiter.store.check(&format!("login:{ip}"), now_ms).await {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    if !decision.allowed {
        let retry_after = decision.retry_after_secs(now_ms);
        tracing::warn!(client_ip = %ip, retry_after, "login rate limit exceeded");

        let mut response = AppError::with_details(
            ErrorCode::RateLimited,
            format!("Terlalu banyak percobaan login. Coba lagi dalam {retry_after} detik"),
            serde_json::json!({ "retry_after": retry_after }),
        )
        .into_response();
        apply_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limiter::{MemoryRateLimiter, SlidingWindow};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn app(trust_proxy_headers: bool) -> Router {
        let store = Arc::new(MemoryRateLimiter::new(SlidingWindow::new(5, 60)));
        let limiter = LoginRateLimit::new(store, trust_proxy_headers);
        Router::new()
            .route("/login", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(limiter, login_rate_limit))
    }

    fn attempt(forwarded_for: &str, peer: [u8; 4]) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/login")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req
    }

    #[tokio::test]
    async fn sixth_attempt_is_rejected_with_retry_after() {
        let app = app(true);
        let proxy = [10, 0, 0, 2];
        for expected_remaining in (0..5).rev() {
            let response = app.clone().oneshot(attempt("10.1.1.1", proxy)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[LIMIT_HEADER], "5");
            assert_eq!(
                response.headers()[REMAINING_HEADER],
                expected_remaining.to_string().as_str()
            );
        }

        let response = app.clone().oneshot(attempt("10.1.1.1", proxy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[REMAINING_HEADER], "0");
        let retry: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry));

        let other = app.oneshot(attempt("10.2.2.2", proxy)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_reset_the_limit() {
        let app = app(false);
        let peer = [192, 0, 2, 7];
        for n in 1..=5 {
            let response = app
                .clone()
                .oneshot(attempt(&format!("10.1.1.{n}"), peer))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(attempt("10.1.1.99", peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn spoofed_first_hop_is_ignored_behind_proxy() {
        let app = app(true);
        let proxy = [10, 0, 0, 2];
        for n in 1..=5 {
            let chain = format!("10.9.9.{n}, 203.0.113.9");
            let response = app.clone().oneshot(attempt(&chain, proxy)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(attempt("1.2.3.4, 203.0.113.9", proxy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn socket_address_is_the_default_key() {
        let req = attempt("203.0.113.9", [192, 0, 2, 7]);
        assert_eq!(client_ip(&req, false), "192.0.2.7");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare, false), "unknown");
    }

    #[test]
    fn trusted_proxy_headers_take_last_hop_then_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "198.51.100.4, 203.0.113.9")
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "203.0.113.9");

        let req = Request::builder()
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "198.51.100.1");

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 5555))));
        assert_eq!(client_ip(&req, true), "192.0.2.7");
    }
}
