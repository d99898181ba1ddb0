use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{AcademicYear, ClassLevel, Classroom, ClassroomChanges, NewClassroom, Teacher};
use crate::routes::academic_years::academic_year_not_found;
use crate::routes::class_levels::class_level_not_found;
use crate::routes::teachers::teacher_not_found;
use crate::routes::{actor, on_conflict};
use crate::schema::{academic_years, class_levels, classrooms, student_class_histories, teachers};
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Kelas";
const DUPLICATE_CLASSROOM: &str = "Kelas dengan tingkat dan tahun ajaran tersebut sudah ada";

pub(crate) fn classroom_not_found() -> AppError {
    AppError::new(ErrorCode::ClassroomNotFound, "Kelas tidak ditemukan")
}

fn duplicate_classroom() -> AppError {
    AppError::new(ErrorCode::DuplicateClassroom, DUPLICATE_CLASSROOM)
}

#[derive(Debug, Deserialize)]
pub struct ClassroomFilter {
    pub academic_year_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ClassroomView {
    #[serde(flatten)]
    pub classroom: Classroom,
    pub class_level: ClassLevel,
    pub academic_year: AcademicYear,
    pub teacher: Option<Teacher>,
    pub student_count: i64,
}

/// Referenced level, year and (optional) teacher must exist.
fn ensure_references(
    conn: &mut PgConnection,
    class_level_id: Option<i32>,
    academic_year_id: Option<i32>,
    teacher_id: Option<i32>,
) -> AppResult<()> {
    if let Some(id) = class_level_id {
        class_levels::table
            .find(id)
            .select(class_levels::id)
            .first::<i32>(conn)
            .optional()?
            .ok_or_else(class_level_not_found)?;
    }
    if let Some(id) = academic_year_id {
        academic_years::table
            .find(id)
            .select(academic_years::id)
            .first::<i32>(conn)
            .optional()?
            .ok_or_else(academic_year_not_found)?;
    }
    if let Some(id) = teacher_id {
        teachers::table
            .find(id)
            .select(teachers::id)
            .first::<i32>(conn)
            .optional()?
            .ok_or_else(teacher_not_found)?;
    }
    Ok(())
}

/// A second classroom for the same (level, year) is rejected.
fn ensure_slot_free(
    conn: &mut PgConnection,
    class_level_id: i32,
    academic_year_id: i32,
    except: Option<i32>,
) -> AppResult<()> {
    let mut query = classrooms::table
        .filter(classrooms::class_level_id.eq(class_level_id))
        .filter(classrooms::academic_year_id.eq(academic_year_id))
        .select(classrooms::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(classrooms::id.ne(id));
    }
    if query.first::<i32>(conn).optional()?.is_some() {
        return Err(duplicate_classroom());
    }
    Ok(())
}

fn load_views(conn: &mut PgConnection, rows: Vec<Classroom>) -> AppResult<Vec<ClassroomView>> {
    let ids: Vec<i32> = rows.iter().map(|c| c.id).collect();

    let counts: HashMap<i32, i64> = student_class_histories::table
        .filter(student_class_histories::classroom_id.eq_any(&ids))
        .filter(student_class_histories::is_active.eq(true))
        .group_by(student_class_histories::classroom_id)
        .select((student_class_histories::classroom_id, count_star()))
        .load::<(i32, i64)>(conn)?
        .into_iter()
        .collect();

    let levels: HashMap<i32, ClassLevel> = class_levels::table
        .load::<ClassLevel>(conn)?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();
    let years: HashMap<i32, AcademicYear> = academic_years::table
        .load::<AcademicYear>(conn)?
        .into_iter()
        .map(|y| (y.id, y))
        .collect();
    let teacher_ids: Vec<i32> = rows.iter().filter_map(|c| c.teacher_id).collect();
    let teachers_by_id: HashMap<i32, Teacher> = teachers::table
        .filter(teachers::id.eq_any(&teacher_ids))
        .load::<Teacher>(conn)?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    rows.into_iter()
        .map(|classroom| {
            let class_level = levels
                .get(&classroom.class_level_id)
                .cloned()
                .ok_or_else(class_level_not_found)?;
            let academic_year = years
                .get(&classroom.academic_year_id)
                .cloned()
                .ok_or_else(academic_year_not_found)?;
            Ok(ClassroomView {
                teacher: classroom.teacher_id.and_then(|id| teachers_by_id.get(&id).cloned()),
                student_count: counts.get(&classroom.id).copied().unwrap_or(0),
                class_level,
                academic_year,
                classroom,
            })
        })
        .collect()
}

// --- GET /api/classrooms ---

pub async fn list_classrooms(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<ClassroomFilter>,
) -> AppResult<Json<ApiResponse<Vec<ClassroomView>>>> {
    let mut conn = get_conn(&state.db)?;

    let mut query = classrooms::table.into_boxed();
    if let Some(year_id) = filter.academic_year_id {
        query = query.filter(classrooms::academic_year_id.eq(year_id));
    }
    let rows = query.order(classrooms::name.asc()).load::<Classroom>(&mut conn)?;

    Ok(Json(ApiResponse::ok(load_views(&mut conn, rows)?)))
}

// --- GET /api/classrooms/:id ---

pub async fn get_classroom(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<ClassroomView>>> {
    let mut conn = get_conn(&state.db)?;

    let classroom = classrooms::table
        .find(id)
        .first::<Classroom>(&mut conn)
        .optional()?
        .ok_or_else(classroom_not_found)?;
    let view = load_views(&mut conn, vec![classroom])?
        .pop()
        .ok_or_else(classroom_not_found)?;

    Ok(Json(ApiResponse::ok(view)))
}

// --- POST /api/classrooms ---

pub async fn create_classroom(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<NewClassroom>,
) -> AppResult<Json<ApiResponse<Classroom>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let classroom = conn.transaction::<_, AppError, _>(|conn| {
        ensure_references(
            conn,
            Some(payload.class_level_id),
            Some(payload.academic_year_id),
            payload.teacher_id,
        )?;
        ensure_slot_free(conn, payload.class_level_id, payload.academic_year_id, None)?;

        let classroom = diesel::insert_into(classrooms::table)
            .values(&payload)
            .get_result::<Classroom>(conn)
            .map_err(on_conflict(ErrorCode::DuplicateClassroom, DUPLICATE_CLASSROOM))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &classroom.name).by(actor(&user)))?;
        Ok(classroom)
    })?;

    tracing::info!(classroom_id = classroom.id, "classroom created");
    Ok(Json(ApiResponse::ok(classroom)))
}

// --- PUT /api/classrooms/:id ---

pub async fn update_classroom(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ClassroomChanges>,
) -> AppResult<Json<ApiResponse<Classroom>>> {
    payload.validate()?;
    if payload.name.is_none()
        && payload.class_level_id.is_none()
        && payload.academic_year_id.is_none()
        && payload.teacher_id.is_none()
    {
        return Err(AppError::incomplete("Tidak ada data yang diubah"));
    }
    let mut conn = get_conn(&state.db)?;

    let classroom = conn.transaction::<_, AppError, _>(|conn| {
        let current = classrooms::table
            .find(id)
            .for_update()
            .get_result::<Classroom>(conn)
            .optional()?
            .ok_or_else(classroom_not_found)?;

        ensure_references(conn, payload.class_level_id, payload.academic_year_id, payload.teacher_id)?;
        ensure_slot_free(
            conn,
            payload.class_level_id.unwrap_or(current.class_level_id),
            payload.academic_year_id.unwrap_or(current.academic_year_id),
            Some(id),
        )?;

        let classroom = diesel::update(classrooms::table.find(id))
            .set(&payload)
            .get_result::<Classroom>(conn)
            .map_err(on_conflict(ErrorCode::DuplicateClassroom, DUPLICATE_CLASSROOM))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &classroom.name).by(actor(&user)))?;
        Ok(classroom)
    })?;

    tracing::info!(classroom_id = classroom.id, "classroom updated");
    Ok(Json(ApiResponse::ok(classroom)))
}

// --- DELETE /api/classrooms/:id ---

pub async fn delete_classroom(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let classroom = diesel::delete(classrooms::table.find(id))
            .get_result::<Classroom>(conn)
            .optional()?
            .ok_or_else(classroom_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &classroom.name).by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(classroom_id = id, "classroom deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
