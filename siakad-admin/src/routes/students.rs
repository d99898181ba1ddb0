use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Serialize;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::pagination::{Paginated, PaginationParams};
use siakad_shared::types::session::AuthUser;

use crate::models::{Classroom, NewStudent, Student, StudentChanges, StudentClassHistory};
use crate::routes::{actor, on_conflict};
use crate::schema::students;
use crate::services::enrollment_service;
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Siswa";
const DUPLICATE_NIS: &str = "NIS sudah digunakan siswa lain";

pub(crate) fn student_not_found() -> AppError {
    AppError::new(ErrorCode::StudentNotFound, "Siswa tidak ditemukan")
}

fn search(pattern: Option<String>) -> students::BoxedQuery<'static, Pg> {
    let mut query = students::table.into_boxed();
    if let Some(p) = pattern {
        query = query.filter(students::name.ilike(p.clone()).or(students::nis.ilike(p)));
    }
    query
}

// --- GET /api/students ---

pub async fn list_students(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Student>>>> {
    let mut conn = get_conn(&state.db)?;

    let total: i64 = search(params.search_pattern()).count().get_result(&mut conn)?;
    let items = search(params.search_pattern())
        .order(students::name.asc())
        .limit(params.limit() as i64)
        .offset(params.offset() as i64)
        .load::<Student>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- GET /api/students/:id ---

pub async fn get_student(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Student>>> {
    let mut conn = get_conn(&state.db)?;

    let student = students::table
        .find(id)
        .first::<Student>(&mut conn)
        .optional()?
        .ok_or_else(student_not_found)?;

    Ok(Json(ApiResponse::ok(student)))
}

// --- POST /api/students ---

pub async fn create_student(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewStudent>,
) -> AppResult<Json<ApiResponse<Student>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let student = conn.transaction::<_, AppError, _>(|conn| {
        let student = diesel::insert_into(students::table)
            .values(&payload)
            .get_result::<Student>(conn)
            .map_err(on_conflict(ErrorCode::DuplicateNis, DUPLICATE_NIS))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &student.name).by(actor(&user)))?;
        Ok(student)
    })?;

    tracing::info!(student_id = student.id, nis = %student.nis, "student created");
    Ok(Json(ApiResponse::ok(student)))
}

// --- PUT /api/students/:id ---

pub async fn update_student(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<StudentChanges>,
) -> AppResult<Json<ApiResponse<Student>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let student = conn.transaction::<_, AppError, _>(|conn| {
        let student = diesel::update(students::table.find(id))
            .set((&payload, students::updated_at.eq(Utc::now())))
            .get_result::<Student>(conn)
            .optional()
            .map_err(on_conflict(ErrorCode::DuplicateNis, DUPLICATE_NIS))?
            .ok_or_else(student_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &student.name).by(actor(&user)))?;
        Ok(student)
    })?;

    tracing::info!(student_id = student.id, "student updated");
    Ok(Json(ApiResponse::ok(student)))
}

// --- DELETE /api/students/:id ---

pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let student = diesel::delete(students::table.find(id))
            .get_result::<Student>(conn)
            .optional()?
            .ok_or_else(student_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &student.name).by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(student_id = id, "student deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}

// --- GET /api/students/:id/class-histories ---

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub history: StudentClassHistory,
    pub classroom: Classroom,
}

pub async fn class_histories(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Vec<HistoryEntry>>>> {
    let mut conn = get_conn(&state.db)?;

    students::table
        .find(id)
        .select(students::id)
        .first::<i32>(&mut conn)
        .optional()?
        .ok_or_else(student_not_found)?;

    let entries = enrollment_service::student_history(&mut conn, id)?
        .into_iter()
        .map(|(history, classroom)| HistoryEntry { history, classroom })
        .collect();

    Ok(Json(ApiResponse::ok(entries)))
}
