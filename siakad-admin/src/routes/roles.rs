use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::Serialize;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::middleware::AdminUser;
use siakad_shared::types::api::{ApiResponse, Deleted};

use crate::models::{NewRole, Role, RoleChanges};
use crate::routes::{actor, on_conflict};
use crate::schema::{roles, users};
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Role";
const ROLE_NAME_TAKEN: &str = "Nama role sudah digunakan";

pub(crate) fn role_not_found() -> AppError {
    AppError::new(ErrorCode::RoleNotFound, "Role tidak ditemukan")
}

/// A role may only be deleted once no user holds it.
pub fn ensure_role_unused(role: &Role, user_count: i64) -> AppResult<()> {
    if user_count > 0 {
        return Err(AppError::with_details(
            ErrorCode::RoleInUse,
            format!(
                "Role {} tidak dapat dihapus karena masih digunakan oleh {} pengguna",
                role.name, user_count
            ),
            serde_json::json!({ "user_count": user_count }),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RoleView {
    #[serde(flatten)]
    pub role: Role,
    pub user_count: i64,
}

// --- GET /api/roles ---

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<RoleView>>>> {
    let mut conn = get_conn(&state.db)?;

    let all = roles::table.order(roles::name.asc()).load::<Role>(&mut conn)?;
    let counts: Vec<(i32, i64)> = users::table
        .group_by(users::role_id)
        .select((users::role_id, diesel::dsl::count_star()))
        .load(&mut conn)?;

    let views = all
        .into_iter()
        .map(|role| {
            let user_count = counts
                .iter()
                .find(|(id, _)| *id == role.id)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            RoleView { role, user_count }
        })
        .collect();

    Ok(Json(ApiResponse::ok(views)))
}

// --- GET /api/roles/:id ---

pub async fn get_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Role>>> {
    let mut conn = get_conn(&state.db)?;
    let role = roles::table
        .find(id)
        .first::<Role>(&mut conn)
        .optional()?
        .ok_or_else(role_not_found)?;
    Ok(Json(ApiResponse::ok(role)))
}

// --- POST /api/roles ---

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<NewRole>,
) -> AppResult<Json<ApiResponse<Role>>> {
    payload.validate()?;
    let mut conn = get_conn(&state.db)?;

    let role = conn.transaction::<_, AppError, _>(|conn| {
        let role = diesel::insert_into(roles::table)
            .values(&payload)
            .get_result::<Role>(conn)
            .map_err(on_conflict(ErrorCode::RoleNameTaken, ROLE_NAME_TAKEN))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &role.name).by(actor(&admin)))?;
        Ok(role)
    })?;

    tracing::info!(role_id = role.id, name = %role.name, "role created");
    Ok(Json(ApiResponse::ok(role)))
}

// --- PUT /api/roles/:id ---

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
    Json(payload): Json<RoleChanges>,
) -> AppResult<Json<ApiResponse<Role>>> {
    payload.validate()?;
    if payload.name.is_none() && payload.description.is_none() {
        return Err(AppError::incomplete("Tidak ada data yang diubah"));
    }
    let mut conn = get_conn(&state.db)?;

    let role = conn.transaction::<_, AppError, _>(|conn| {
        let role = diesel::update(roles::table.find(id))
            .set(&payload)
            .get_result::<Role>(conn)
            .optional()
            .map_err(on_conflict(ErrorCode::RoleNameTaken, ROLE_NAME_TAKEN))?
            .ok_or_else(role_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &role.name).by(actor(&admin)))?;
        Ok(role)
    })?;

    tracing::info!(role_id = role.id, "role updated");
    Ok(Json(ApiResponse::ok(role)))
}

// --- DELETE /api/roles/:id ---

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let role = roles::table
            .find(id)
            .for_update()
            .get_result::<Role>(conn)
            .optional()?
            .ok_or_else(role_not_found)?;

        let user_count: i64 = users::table
            .filter(users::role_id.eq(id))
            .count()
            .get_result(conn)?;
        ensure_role_unused(&role, user_count)?;

        diesel::delete(roles::table.find(id)).execute(conn)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &role.name).by(actor(&admin)))?;
        Ok(())
    })?;

    tracing::info!(role_id = id, "role deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn role() -> Role {
        Role {
            id: 2,
            name: "operator".into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn role_in_use_cannot_be_deleted() {
        let err = ensure_role_unused(&role(), 3).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::RoleInUse);
        assert_eq!(err.error_code().status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("operator"));
    }

    #[test]
    fn unused_role_can_be_deleted() {
        assert!(ensure_role_unused(&role(), 0).is_ok());
    }
}
