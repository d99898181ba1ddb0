use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Datelike, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{LedgerChanges, LedgerEntry, LedgerForm};
use crate::routes::actor;
use crate::schema::{expenses, incomes};
use crate::services::finance_service::{self, period_range, FinanceSummary};
use crate::services::notification_service::{notify_admins, AdminNotice, EntityAction};
use crate::AppState;

/// Which book an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Income,
    Expense,
}

impl LedgerKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Income => "Pemasukan",
            Self::Expense => "Pengeluaran",
        }
    }

    fn not_found(&self) -> AppError {
        AppError::new(
            ErrorCode::LedgerEntryNotFound,
            format!("Data {} tidak ditemukan", self.label().to_lowercase()),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
}

fn ensure_non_negative(amount: Option<i64>) -> AppResult<()> {
    if amount.is_some_and(|a| a < 0) {
        return Err(AppError::incomplete("Nominal tidak boleh negatif"));
    }
    Ok(())
}

fn load_entries(conn: &mut PgConnection, kind: LedgerKind, filter: &LedgerFilter) -> AppResult<Vec<LedgerEntry>> {
    let range = match (filter.year, filter.month) {
        (None, None) => None,
        (year, month) => Some(period_range(year.unwrap_or_else(|| Utc::now().year()), month)?),
    };

    let entries = match kind {
        LedgerKind::Income => {
            let mut query = incomes::table.into_boxed();
            if let Some((start, end)) = range {
                query = query
                    .filter(incomes::transaction_date.ge(start))
                    .filter(incomes::transaction_date.lt(end));
            }
            query
                .order((incomes::transaction_date.desc(), incomes::id.desc()))
                .load::<LedgerEntry>(conn)?
        }
        LedgerKind::Expense => {
            let mut query = expenses::table.into_boxed();
            if let Some((start, end)) = range {
                query = query
                    .filter(expenses::transaction_date.ge(start))
                    .filter(expenses::transaction_date.lt(end));
            }
            query
                .order((expenses::transaction_date.desc(), expenses::id.desc()))
                .load::<LedgerEntry>(conn)?
        }
    };
    Ok(entries)
}

fn find_entry(conn: &mut PgConnection, kind: LedgerKind, id: i32) -> AppResult<LedgerEntry> {
    let entry = match kind {
        LedgerKind::Income => incomes::table.find(id).first::<LedgerEntry>(conn).optional()?,
        LedgerKind::Expense => expenses::table.find(id).first::<LedgerEntry>(conn).optional()?,
    };
    entry.ok_or_else(|| kind.not_found())
}

fn insert_entry(conn: &mut PgConnection, kind: LedgerKind, form: &LedgerForm) -> QueryResult<LedgerEntry> {
    match kind {
        LedgerKind::Income => diesel::insert_into(incomes::table)
            .values((
                incomes::description.eq(&form.description),
                incomes::amount.eq(form.amount),
                incomes::transaction_date.eq(form.transaction_date),
                incomes::category.eq(form.category.clone()),
            ))
            .get_result(conn),
        LedgerKind::Expense => diesel::insert_into(expenses::table)
            .values((
                expenses::description.eq(&form.description),
                expenses::amount.eq(form.amount),
                expenses::transaction_date.eq(form.transaction_date),
                expenses::category.eq(form.category.clone()),
            ))
            .get_result(conn),
    }
}

fn update_entry(
    conn: &mut PgConnection,
    kind: LedgerKind,
    id: i32,
    changes: &LedgerChanges,
) -> QueryResult<Option<LedgerEntry>> {
    match kind {
        LedgerKind::Income => diesel::update(incomes::table.find(id))
            .set((
                changes.description.as_ref().map(|d| incomes::description.eq(d)),
                changes.amount.map(|a| incomes::amount.eq(a)),
                changes.transaction_date.map(|d| incomes::transaction_date.eq(d)),
                changes.category.as_ref().map(|c| incomes::category.eq(c)),
            ))
            .get_result(conn)
            .optional(),
        LedgerKind::Expense => diesel::update(expenses::table.find(id))
            .set((
                changes.description.as_ref().map(|d| expenses::description.eq(d)),
                changes.amount.map(|a| expenses::amount.eq(a)),
                changes.transaction_date.map(|d| expenses::transaction_date.eq(d)),
                changes.category.as_ref().map(|c| expenses::category.eq(c)),
            ))
            .get_result(conn)
            .optional(),
    }
}

fn delete_entry(conn: &mut PgConnection, kind: LedgerKind, id: i32) -> QueryResult<Option<LedgerEntry>> {
    match kind {
        LedgerKind::Income => diesel::delete(incomes::table.find(id)).get_result(conn).optional(),
        LedgerKind::Expense => diesel::delete(expenses::table.find(id)).get_result(conn).optional(),
    }
}

async fn list(state: &AppState, kind: LedgerKind, filter: LedgerFilter) -> AppResult<Json<ApiResponse<Vec<LedgerEntry>>>> {
    let mut conn = get_conn(&state.db)?;
    Ok(Json(ApiResponse::ok(load_entries(&mut conn, kind, &filter)?)))
}

async fn get(state: &AppState, kind: LedgerKind, id: i32) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    let mut conn = get_conn(&state.db)?;
    Ok(Json(ApiResponse::ok(find_entry(&mut conn, kind, id)?)))
}

async fn create(
    state: &AppState,
    kind: LedgerKind,
    user: &AuthUser,
    form: LedgerForm,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    form.validate()?;
    ensure_non_negative(Some(form.amount))?;
    let mut conn = get_conn(&state.db)?;

    let entry = conn.transaction::<_, AppError, _>(|conn| {
        let entry = insert_entry(conn, kind, &form)?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Created, kind.label(), &entry.description).by(actor(user)))?;
        Ok(entry)
    })?;

    tracing::info!(kind = ?kind, entry_id = entry.id, amount = entry.amount, "ledger entry created");
    Ok(Json(ApiResponse::ok(entry)))
}

async fn update(
    state: &AppState,
    kind: LedgerKind,
    user: &AuthUser,
    id: i32,
    changes: LedgerChanges,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    changes.validate()?;
    ensure_non_negative(changes.amount)?;
    if changes.description.is_none()
        && changes.amount.is_none()
        && changes.transaction_date.is_none()
        && changes.category.is_none()
    {
        return Err(AppError::incomplete("Tidak ada data yang diubah"));
    }
    let mut conn = get_conn(&state.db)?;

    let entry = conn.transaction::<_, AppError, _>(|conn| {
        let entry = update_entry(conn, kind, id, &changes)?.ok_or_else(|| kind.not_found())?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Updated, kind.label(), &entry.description).by(actor(user)))?;
        Ok(entry)
    })?;

    tracing::info!(kind = ?kind, entry_id = entry.id, "ledger entry updated");
    Ok(Json(ApiResponse::ok(entry)))
}

async fn remove(state: &AppState, kind: LedgerKind, user: &AuthUser, id: i32) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let entry = delete_entry(conn, kind, id)?.ok_or_else(|| kind.not_found())?;
        notify_admins(conn, &AdminNotice::entity(EntityAction::Deleted, kind.label(), &entry.description).by(actor(user)))?;
        Ok(())
    })?;

    tracing::info!(kind = ?kind, entry_id = id, "ledger entry deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}

// --- /api/incomes ---

pub async fn list_incomes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<LedgerFilter>,
) -> AppResult<Json<ApiResponse<Vec<LedgerEntry>>>> {
    list(&state, LedgerKind::Income, filter).await
}

pub async fn get_income(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    get(&state, LedgerKind::Income, id).await
}

pub async fn create_income(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(form): Json<LedgerForm>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    create(&state, LedgerKind::Income, &user, form).await
}

pub async fn update_income(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(changes): Json<LedgerChanges>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    update(&state, LedgerKind::Income, &user, id, changes).await
}

pub async fn delete_income(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    remove(&state, LedgerKind::Income, &user, id).await
}

// --- /api/expenses ---

pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<LedgerFilter>,
) -> AppResult<Json<ApiResponse<Vec<LedgerEntry>>>> {
    list(&state, LedgerKind::Expense, filter).await
}

pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    get(&state, LedgerKind::Expense, id).await
}

pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(form): Json<LedgerForm>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    create(&state, LedgerKind::Expense, &user, form).await
}

pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(changes): Json<LedgerChanges>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    update(&state, LedgerKind::Expense, &user, id, changes).await
}

pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    remove(&state, LedgerKind::Expense, &user, id).await
}

// --- GET /api/finance/summary ---

pub async fn finance_summary(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<ApiResponse<FinanceSummary>>> {
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let mut conn = get_conn(&state.db)?;
    Ok(Json(ApiResponse::ok(finance_service::summary(&mut conn, year)?)))
}
