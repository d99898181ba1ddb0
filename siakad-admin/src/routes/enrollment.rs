use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::AppResult;
use siakad_shared::types::api::{Affected, ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{Student, StudentClassHistory};
use crate::routes::actor;
use crate::services::enrollment_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    #[serde(default)]
    pub student_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct RosterEntry {
    pub history_id: i32,
    pub student: Student,
}

// --- GET /api/classrooms/:id/students ---

pub async fn list_roster(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(classroom_id): Path<i32>,
) -> AppResult<Json<ApiResponse<Vec<RosterEntry>>>> {
    let mut conn = get_conn(&state.db)?;

    let roster = enrollment_service::active_roster(&mut conn, classroom_id)?
        .into_iter()
        .map(|(history, student)| RosterEntry {
            history_id: history.id,
            student,
        })
        .collect();

    Ok(Json(ApiResponse::ok(roster)))
}

// --- POST /api/classrooms/:id/students ---

pub async fn enroll_students(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(classroom_id): Path<i32>,
    Json(req): Json<EnrollRequest>,
) -> AppResult<Json<ApiResponse<Vec<StudentClassHistory>>>> {
    let mut conn = get_conn(&state.db)?;
    let created = enrollment_service::enroll_students(&mut conn, classroom_id, &req.student_ids, actor(&user))?;
    Ok(Json(ApiResponse::ok(created)))
}

// --- DELETE /api/classrooms/:id/students/:student_id ---

pub async fn remove_student(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((classroom_id, student_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let mut conn = get_conn(&state.db)?;
    let count = enrollment_service::remove_from_classroom(&mut conn, classroom_id, student_id, actor(&user))?;
    Ok(Json(ApiResponse::ok(Affected { count })))
}

// --- PUT /api/class-histories/:id/toggle ---

pub async fn toggle_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<StudentClassHistory>>> {
    let mut conn = get_conn(&state.db)?;
    let history = enrollment_service::toggle_history(&mut conn, id, actor(&user))?;
    Ok(Json(ApiResponse::ok(history)))
}

// --- DELETE /api/class-histories/:id ---

pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;
    enrollment_service::delete_history(&mut conn, id, actor(&user))?;
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
