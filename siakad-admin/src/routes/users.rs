use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::middleware::AdminUser;
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{NewUser, Role, User, UserChanges};
use crate::routes::roles::role_not_found;
use crate::routes::{actor, on_conflict};
use crate::schema::{roles, users};
use crate::services::auth_service;
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

const ENTITY: &str = "Pengguna";
const EMAIL_TAKEN: &str = "Email sudah terdaftar";

fn user_not_found() -> AppError {
    AppError::new(ErrorCode::UserNotFound, "Pengguna tidak ditemukan")
}

// --- Request / Response types ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "nama wajib diisi"))]
    pub name: String,
    #[validate(email(message = "format email tidak valid"))]
    pub email: String,
    pub password: String,
    pub role_id: i32,
    #[validate(length(max = 255))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "nama tidak boleh kosong"))]
    pub name: Option<String>,
    #[validate(email(message = "format email tidak valid"))]
    pub email: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i32>,
    #[validate(length(max = 255))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub role: Role,
}

/// An admin cannot delete the account they are signed in with.
pub fn ensure_not_self(actor_id: i32, target_id: i32) -> AppResult<()> {
    if actor_id == target_id {
        return Err(AppError::new(
            ErrorCode::CannotDeleteSelf,
            "Anda tidak dapat menghapus akun sendiri",
        ));
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn ensure_role(conn: &mut PgConnection, role_id: i32) -> AppResult<Role> {
    roles::table
        .find(role_id)
        .first::<Role>(conn)
        .optional()?
        .ok_or_else(role_not_found)
}

fn load_view(conn: &mut PgConnection, id: i32) -> AppResult<UserView> {
    let (user, role) = users::table
        .inner_join(roles::table)
        .filter(users::id.eq(id))
        .first::<(User, Role)>(conn)
        .optional()?
        .ok_or_else(user_not_found)?;
    Ok(UserView { user, role })
}

// --- GET /api/users ---

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<UserView>>>> {
    let mut conn = get_conn(&state.db)?;

    let pattern = params.search_pattern();
    let mut count_query = users::table.into_boxed();
    let mut items_query = users::table.inner_join(roles::table).into_boxed();
    if let Some(p) = pattern {
        count_query = count_query.filter(users::name.ilike(p.clone()).or(users::email.ilike(p.clone())));
        items_query = items_query.filter(users::name.ilike(p.clone()).or(users::email.ilike(p)));
    }

    let total: i64 = count_query.count().get_result(&mut conn)?;
    let items = items_query
        .order(users::name.asc())
        .limit(params.limit() as i64)
        .offset(params.offset() as i64)
        .load::<(User, Role)>(&mut conn)?
        .into_iter()
        .map(|(user, role)| UserView { user, role })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- GET /api/users/:id ---

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<UserView>>> {
    let mut conn = get_conn(&state.db)?;
    Ok(Json(ApiResponse::ok(load_view(&mut conn, id)?)))
}

// --- POST /api/users ---

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<UserView>>> {
    req.validate()?;
    auth_service::validate_password(&req.password)?;
    let password_hash = auth_service::hash_password(&req.password)?;
    let mut conn = get_conn(&state.db)?;

    let view = conn.transaction::<_, AppError, _>(|conn| {
        ensure_role(conn, req.role_id)?;
        let user = diesel::insert_into(users::table)
            .values(&NewUser {
                name: req.name.trim().to_string(),
                email: normalize_email(&req.email),
                password_hash,
                role_id: req.role_id,
                avatar_url: req.avatar_url.clone(),
            })
            .get_result::<User>(conn)
            .map_err(on_conflict(ErrorCode::EmailAlreadyExists, EMAIL_TAKEN))?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, ENTITY, &user.name).by(actor(&admin)))?;
        load_view(conn, user.id)
    })?;

    tracing::info!(user_id = view.user.id, role = %view.role.name, "user created");
    Ok(Json(ApiResponse::ok(view)))
}

// --- PUT /api/users/:id ---

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserView>>> {
    req.validate()?;
    let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            auth_service::validate_password(password)?;
            Some(auth_service::hash_password(password)?)
        }
        None => None,
    };
    let mut conn = get_conn(&state.db)?;

    let view = conn.transaction::<_, AppError, _>(|conn| {
        if let Some(role_id) = req.role_id {
            ensure_role(conn, role_id)?;
        }
        let changes = UserChanges {
            name: req.name.as_deref().map(|n| n.trim().to_string()),
            email: req.email.as_deref().map(normalize_email),
            password_hash,
            role_id: req.role_id,
            avatar_url: req.avatar_url.clone(),
        };

        let user = diesel::update(users::table.find(id))
            .set((&changes, users::updated_at.eq(Utc::now())))
            .get_result::<User>(conn)
            .optional()
            .map_err(on_conflict(ErrorCode::EmailAlreadyExists, EMAIL_TAKEN))?
            .ok_or_else(user_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, ENTITY, &user.name).by(actor(&admin)))?;
        load_view(conn, user.id)
    })?;

    tracing::info!(user_id = id, "user updated");
    Ok(Json(ApiResponse::ok(view)))
}

// --- DELETE /api/users/:id ---

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    ensure_not_self(admin.id, id)?;
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let user = diesel::delete(users::table.find(id))
            .get_result::<User>(conn)
            .optional()?
            .ok_or_else(user_not_found)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, ENTITY, &user.name).by(actor(&admin)))?;
        Ok(())
    })?;

    tracing::info!(user_id = id, "user deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
