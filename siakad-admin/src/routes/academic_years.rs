use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{AcademicYear, AcademicYearChanges, NewAcademicYear};
use crate::routes::{actor, still_referenced};
use crate::schema::academic_years;
use crate::services::notification_service::{
    html_escape, notify_admins, AdminNotice, EntityAction, NotificationKind,
};
use crate::AppState;

const ENTITY: &str = "Tahun Ajaran";

pub(crate) fn academic_year_not_found() -> AppError {
    AppError::new(ErrorCode::AcademicYearNotFound, "Tahun ajaran tidak ditemukan")
}

/// Deactivate every academic year except `keep`.
fn deactivate_others(conn: &mut PgConnection, keep: i32) -> QueryResult<usize> {
    diesel::update(
        academic_years::table
            .filter(academic_years::id.ne(keep))
            .filter(academic_years::is_active.eq(true)),
    )
    .set(academic_years::is_active.eq(false))
    .execute(conn)
}

pub async fn list_academic_years(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<AcademicYear>>>> {
    let mut conn = get_conn(&state.db)?;
    let items = academic_years::table
        .order(academic_years::name.desc())
        .load::<AcademicYear>(&mut conn)?;
    Ok(Json(ApiResponse::ok(items)))
}

pub async fn get_academic_year(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<AcademicYear>>> {
    let mut conn = get_conn(&state.db)?;
    let year = academic_years::table
        .find(id)
        .first::<AcademicYear>(&mut conn)
        .optional()?
        .ok_or_else(academic_year_not_found)?;
    Ok(Json(ApiResponse::ok(year)))
}

pub async fn create_academic_year(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewAcademicYear>,
) -> AppResult<Json<ApiResponse<AcademicYear>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let year = conn.transaction::<_, AppError, _>(|conn| {
        let year = diesel::insert_into(academic_years::table)
            .values(&payload)
            .get_result::<AcademicYear>(conn)?;
        if year.is_active {
            deactivate_others(conn, year.id)?;
        }
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &year.name).by(actor(&user)))?;
        Ok(year)
    })?;

    tracing::info!(academic_year_id = year.id, is_active = year.is_active, "academic year created");
    Ok(Json(ApiResponse::ok(year)))
}

pub async fn update_academic_year(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<AcademicYearChanges>,
) -> AppResult<Json<ApiResponse<AcademicYear>>> {
    payload.validate()?;
    if payload.name.is_none() && payload.is_active.is_none() {
        return Err(AppError::incomplete("Tidak ada data yang diubah"));
    }
    let mut conn = get_conn(&state.db)?;

    let year = conn.transaction::<_, AppError, _>(|conn| {
        let year = diesel::update(academic_years::table.find(id))
            .set(&payload)
            .get_result::<AcademicYear>(conn)
            .optional()?
            .ok_or_else(academic_year_not_found)?;
        if year.is_active {
            deactivate_others(conn, year.id)?;
        }
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &year.name).by(actor(&user)))?;
        Ok(year)
    })?;

    tracing::info!(academic_year_id = year.id, "academic year updated");
    Ok(Json(ApiResponse::ok(year)))
}

// --- PUT /api/academic-years/:id/activate ---

pub async fn activate_academic_year(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<AcademicYear>>> {
    let mut conn = get_conn(&state.db)?;

    let year = conn.transaction::<_, AppError, _>(|conn| {
        academic_years::table
            .find(id)
            .for_update()
            .get_result::<AcademicYear>(conn)
            .optional()?
            .ok_or_else(academic_year_not_found)?;

        let deactivated = deactivate_others(conn, id)?;
        let year = diesel::update(academic_years::table.find(id))
            .set(academic_years::is_active.eq(true))
            .get_result::<AcademicYear>(conn)?;

        let notice = AdminNotice::new(
            "Tahun Ajaran Aktif",
            format!(
                "Tahun ajaran <strong>{}</strong> sekarang aktif",
                html_escape(&year.name)
            ),
            NotificationKind::Info,
        );
        notify_admins(conn, &notice.by(actor(&user)))?;

        tracing::info!(academic_year_id = id, deactivated, "academic year activated");
        Ok(year)
    })?;

    Ok(Json(ApiResponse::ok(year)))
}

pub async fn delete_academic_year(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let year = diesel::delete(academic_years::table.find(id))
            .get_result::<AcademicYear>(conn)
            .optional()
            .map_err(still_referenced("Tahun ajaran masih digunakan oleh kelas"))?
            .ok_or_else(academic_year_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &year.name).by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(academic_year_id = id, "academic year deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
