use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{Datelike, Utc};
use diesel::prelude::*;
use serde::Serialize;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::AppResult;
use siakad_shared::types::api::ApiResponse;
use siakad_shared::types::session::AuthUser;

use crate::models::AcademicYear;
use crate::schema::{academic_years, classrooms, student_class_histories, students, teachers};
use crate::services::finance_service::{self, FinanceSummary};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub students: i64,
    pub teachers: i64,
    pub classrooms: i64,
    pub active_enrollments: i64,
    pub active_academic_year: Option<AcademicYear>,
    pub finance: FinanceSummary,
}

// --- GET /api/dashboard ---

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let mut conn = get_conn(&state.db)?;

    let students: i64 = students::table.count().get_result(&mut conn)?;
    let teachers: i64 = teachers::table.count().get_result(&mut conn)?;
    let classrooms: i64 = classrooms::table.count().get_result(&mut conn)?;
    let active_enrollments: i64 = student_class_histories::table
        .filter(student_class_histories::is_active.eq(true))
        .count()
        .get_result(&mut conn)?;
    let active_academic_year = academic_years::table
        .filter(academic_years::is_active.eq(true))
        .first::<AcademicYear>(&mut conn)
        .optional()?;
    let finance = finance_service::summary(&mut conn, Utc::now().year())?;

    Ok(Json(ApiResponse::ok(DashboardStats {
        students,
        teachers,
        classrooms,
        active_enrollments,
        active_academic_year,
        finance,
    })))
}
