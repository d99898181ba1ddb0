use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::pagination::{Paginated, PaginationParams};
use siakad_shared::types::session::AuthUser;

use crate::models::{NewTeacher, Teacher, TeacherChanges};
use crate::routes::{actor, on_conflict};
use crate::schema::teachers;
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Guru";
const DUPLICATE_NIP: &str = "NIP sudah digunakan guru lain";

pub(crate) fn teacher_not_found() -> AppError {
    AppError::new(ErrorCode::TeacherNotFound, "Guru tidak ditemukan")
}

fn search(pattern: Option<String>) -> teachers::BoxedQuery<'static, Pg> {
    let mut query = teachers::table.into_boxed();
    if let Some(p) = pattern {
        query = query.filter(teachers::name.ilike(p.clone()).or(teachers::nip.assume_not_null().ilike(p)));
    }
    query
}

pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Teacher>>>> {
    let mut conn = get_conn(&state.db)?;

    let total: i64 = search(params.search_pattern()).count().get_result(&mut conn)?;
    let items = search(params.search_pattern())
        .order(teachers::name.asc())
        .limit(params.limit() as i64)
        .offset(params.offset() as i64)
        .load::<Teacher>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

pub async fn get_teacher(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Teacher>>> {
    let mut conn = get_conn(&state.db)?;

    let teacher = teachers::table
        .find(id)
        .first::<Teacher>(&mut conn)
        .optional()?
        .ok_or_else(teacher_not_found)?;

    Ok(Json(ApiResponse::ok(teacher)))
}

pub async fn create_teacher(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewTeacher>,
) -> AppResult<Json<ApiResponse<Teacher>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let teacher = conn.transaction::<_, AppError, _>(|conn| {
        let teacher = diesel::insert_into(teachers::table)
            .values(&payload)
            .get_result::<Teacher>(conn)
            .map_err(on_conflict(ErrorCode::DuplicateNip, DUPLICATE_NIP))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &teacher.name).by(actor(&user)))?;
        Ok(teacher)
    })?;

    tracing::info!(teacher_id = teacher.id, "teacher created");
    Ok(Json(ApiResponse::ok(teacher)))
}

pub async fn update_teacher(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<TeacherChanges>,
) -> AppResult<Json<ApiResponse<Teacher>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let teacher = conn.transaction::<_, AppError, _>(|conn| {
        let teacher = diesel::update(teachers::table.find(id))
            .set((&payload, teachers::updated_at.eq(Utc::now())))
            .get_result::<Teacher>(conn)
            .optional()
            .map_err(on_conflict(ErrorCode::DuplicateNip, DUPLICATE_NIP))?
            .ok_or_else(teacher_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &teacher.name).by(actor(&user)))?;
        Ok(teacher)
    })?;

    tracing::info!(teacher_id = teacher.id, "teacher updated");
    Ok(Json(ApiResponse::ok(teacher)))
}

pub async fn delete_teacher(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let teacher = diesel::delete(teachers::table.find(id))
            .get_result::<Teacher>(conn)
            .optional()?
            .ok_or_else(teacher_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &teacher.name).by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(teacher_id = id, "teacher deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
