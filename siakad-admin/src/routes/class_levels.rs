use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{ClassLevel, ClassLevelForm};
use crate::routes::{actor, still_referenced};
use crate::schema::class_levels;
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Tingkat";

pub(crate) fn class_level_not_found() -> AppError {
    AppError::new(ErrorCode::ClassLevelNotFound, "Tingkat kelas tidak ditemukan")
}

pub async fn list_class_levels(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<ClassLevel>>>> {
    let mut conn = get_conn(&state.db)?;
    let items = class_levels::table
        .order(class_levels::name.asc())
        .load::<ClassLevel>(&mut conn)?;
    Ok(Json(ApiResponse::ok(items)))
}

pub async fn get_class_level(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<ClassLevel>>> {
    let mut conn = get_conn(&state.db)?;
    let level = class_levels::table
        .find(id)
        .first::<ClassLevel>(&mut conn)
        .optional()?
        .ok_or_else(class_level_not_found)?;
    Ok(Json(ApiResponse::ok(level)))
}

pub async fn create_class_level(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ClassLevelForm>,
) -> AppResult<Json<ApiResponse<ClassLevel>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let level = conn.transaction::<_, AppError, _>(|conn| {
        let level = diesel::insert_into(class_levels::table)
            .values(&payload)
            .get_result::<ClassLevel>(conn)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &level.name).by(actor(&user)))?;
        Ok(level)
    })?;

    tracing::info!(class_level_id = level.id, "class level created");
    Ok(Json(ApiResponse::ok(level)))
}

pub async fn update_class_level(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ClassLevelForm>,
) -> AppResult<Json<ApiResponse<ClassLevel>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let level = conn.transaction::<_, AppError, _>(|conn| {
        let level = diesel::update(class_levels::table.find(id))
            .set(&payload)
            .get_result::<ClassLevel>(conn)
            .optional()?
            .ok_or_else(class_level_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &level.name).by(actor(&user)))?;
        Ok(level)
    })?;

    tracing::info!(class_level_id = level.id, "class level updated");
    Ok(Json(ApiResponse::ok(level)))
}

pub async fn delete_class_level(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let level = diesel::delete(class_levels::table.find(id))
            .get_result::<ClassLevel>(conn)
            .optional()
            .map_err(still_referenced("Tingkat masih digunakan oleh kelas"))?
            .ok_or_else(class_level_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &level.name).by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(class_level_id = id, "class level deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
