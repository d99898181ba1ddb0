use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use siakad_shared::errors::AppResult;
use siakad_shared::types::api::{Affected, ApiResponse, Deleted};
use siakad_shared::types::pagination::{Paginated, PaginationParams};
use siakad_shared::types::session::AuthUser;

use crate::models::Notification;
use crate::services::notification_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    #[serde(default)]
    pub unread: bool,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl InboxQuery {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
            q: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// GET /api/notifications
/// Inbox of the signed-in user, newest first. `?unread=true` hides read items.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<InboxQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let params = query.pagination();
    let (items, total) = notification_service::list_notifications(
        &state.db,
        auth_user.id,
        params.limit() as i64,
        params.offset() as i64,
        query.unread,
    )?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let count = notification_service::count_unread(&state.db, auth_user.id)?;
    Ok(Json(ApiResponse::ok(UnreadCountResponse { count })))
}

/// PUT /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let count = notification_service::mark_all_read(&state.db, auth_user.id)?;
    tracing::debug!(user_id = auth_user.id, count, "notifications marked read");
    Ok(Json(ApiResponse::ok(Affected { count })))
}

/// PUT /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = notification_service::mark_read(&state.db, id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(notification)))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    notification_service::delete_notification(&state.db, id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
