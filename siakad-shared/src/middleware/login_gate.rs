use axum::body::Body;
use axum::extract::OriginalUri;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::middleware::verify_session;
use crate::types::session::{cookie_value, session_secret, SESSION_COOKIE};

/// Path of the login page unauthenticated admin requests are sent to.
pub const LOGIN_PATH: &str = "/login";

/// Request-boundary gate for `/admin/*`: anything without a valid session
/// cookie is redirected to the login page, remembering where it was headed.
pub async fn login_gate(req: Request<Body>, next: Next) -> Response {
    let authenticated = cookie_value(req.headers(), SESSION_COOKIE)
        .map(|token| verify_session(token, &session_secret()).is_ok())
        .unwrap_or(false);

    if authenticated {
        return next.run(req).await;
    }

    // Nested routers see a stripped path; redirect back to the full one.
    let target = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.clone())
        .unwrap_or_else(|| req.uri().clone());
    let target = target
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/admin".to_string());

    tracing::debug!(target = %target, "unauthenticated admin request redirected to login");
    Redirect::to(&login_location(&target)).into_response()
}

/// `/login?redirect=<encoded target>`
pub fn login_location(target: &str) -> String {
    format!("{LOGIN_PATH}?redirect={}", urlencoding::encode(target))
}
