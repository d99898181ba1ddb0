use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult};
use siakad_shared::types::api::ApiResponse;
use siakad_shared::types::session::{
    clear_session_cookie, session_cookie, session_secret, AuthUser,
};
use siakad_shared::middleware::OptionalAuthUser;

use crate::models::User;
use crate::services::auth_service;
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub role: String,
    #[serde(rename = "sessionId")]
    pub session_id: uuid::Uuid,
    pub expires_at: i64,
}

// --- POST /api/auth/login ---

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::incomplete("Email dan password wajib diisi"));
    }

    let mut conn = get_conn(&state.db)?;
    let (user, role) = auth_service::authenticate(&mut conn, &req.email, &req.password).map_err(|e| {
        tracing::warn!(email = %req.email, "login failed");
        e
    })?;

    let (claims, token) =
        auth_service::start_session(&user, &role, &session_secret(), state.config.session_ttl_secs)?;
    let cookie = session_cookie(&token, state.config.session_ttl_secs, state.config.cookie_secure);

    tracing::info!(user_id = user.id, session_id = %claims.session_id, "user logged in");

    let body = LoginResponse {
        role: role.name,
        session_id: claims.session_id,
        expires_at: claims.exp,
        user,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(ApiResponse::ok(body))).into_response())
}

// --- POST /api/auth/logout ---

pub async fn logout(State(state): State<Arc<AppState>>, OptionalAuthUser(user): OptionalAuthUser) -> Response {
    if let Some(user) = user {
        tracing::info!(user_id = user.id, session_id = %user.session_id, "user logged out");
    }
    (
        [(header::SET_COOKIE, clear_session_cookie(state.config.cookie_secure))],
        Json(ApiResponse::ok_with_message((), "Berhasil logout")),
    )
        .into_response()
}

// --- GET /api/auth/me ---

pub async fn me(user: AuthUser) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::ok(user))
}
