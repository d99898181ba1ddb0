use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

use siakad_shared::clients::db::get_conn;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::{ApiResponse, Deleted};
use siakad_shared::types::session::AuthUser;

use crate::models::{SppPayment, SppPaymentChanges};
use crate::routes::actor;
use crate::routes::students::student_not_found;
use crate::schema::{spp_payments, students};
use crate::services::notification_service::{html_escape, notify_admins, AdminNotice, NotificationKind};
use crate::services::payment_service::{self, BillingMonth, GenerateSppRequest, GeneratedPayments};
use crate::AppState;

fn payment_not_found() -> AppError {
    AppError::new(ErrorCode::PaymentNotFound, "Data pembayaran tidak ditemukan")
}

#[derive(Debug, Deserialize)]
pub struct PaymentFilter {
    pub student_id: Option<i32>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct LastPayment {
    pub payment: Option<SppPayment>,
    /// First month the generator would produce without an explicit start.
    pub next: Option<BillingMonth>,
}

// --- POST /api/spp/generate ---

pub async fn generate_payments(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<GenerateSppRequest>,
) -> AppResult<Json<ApiResponse<GeneratedPayments>>> {
    let order = req.validate_request()?;
    let mut conn = get_conn(&state.db)?;

    let generated = payment_service::generate(&mut conn, &order, actor(&user))?;
    let message = format!("{} bulan pembayaran SPP berhasil dibuat", generated.count);
    Ok(Json(ApiResponse::ok_with_message(generated, message)))
}

// --- GET /api/spp/students/:id/last-payment ---

pub async fn last_payment(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(student_id): Path<i32>,
) -> AppResult<Json<ApiResponse<LastPayment>>> {
    let mut conn = get_conn(&state.db)?;

    students::table
        .find(student_id)
        .select(students::id)
        .first::<i32>(&mut conn)
        .optional()?
        .ok_or_else(student_not_found)?;

    let payment = payment_service::last_payment(&mut conn, student_id)?;
    let next = payment.as_ref().map(|p| BillingMonth::from(p).next());

    Ok(Json(ApiResponse::ok(LastPayment { payment, next })))
}

// --- GET /api/spp ---

pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<PaymentFilter>,
) -> AppResult<Json<ApiResponse<Vec<SppPayment>>>> {
    let mut conn = get_conn(&state.db)?;

    let mut query = spp_payments::table.into_boxed();
    if let Some(student_id) = filter.student_id {
        query = query.filter(spp_payments::student_id.eq(student_id));
    }
    if let Some(year) = filter.year {
        query = query.filter(spp_payments::year.eq(year));
    }
    let items = query
        .order((
            spp_payments::student_id.asc(),
            spp_payments::year.asc(),
            spp_payments::month.asc(),
        ))
        .load::<SppPayment>(&mut conn)?;

    Ok(Json(ApiResponse::ok(items)))
}

// --- GET /api/spp/:id ---

pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<SppPayment>>> {
    let mut conn = get_conn(&state.db)?;

    let payment = spp_payments::table
        .find(id)
        .first::<SppPayment>(&mut conn)
        .optional()?
        .ok_or_else(payment_not_found)?;

    Ok(Json(ApiResponse::ok(payment)))
}

// --- PUT /api/spp/:id ---

pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<SppPaymentChanges>,
) -> AppResult<Json<ApiResponse<SppPayment>>> {
    payload.validate()?;
    if payload.amount.is_some_and(|a| a < 0) || payload.infaq.is_some_and(|i| i < 0) {
        return Err(AppError::incomplete("Nominal dan infaq tidak boleh negatif"));
    }
    if payload.month.is_none()
        && payload.year.is_none()
        && payload.paid_at.is_none()
        && payload.amount.is_none()
        && payload.infaq.is_none()
    {
        return Err(AppError::incomplete("Tidak ada data yang diubah"));
    }
    let mut conn = get_conn(&state.db)?;

    let payment = conn.transaction::<_, AppError, _>(|conn| {
        let payment = diesel::update(spp_payments::table.find(id))
            .set(&payload)
            .get_result::<SppPayment>(conn)
            .optional()
            .map_err(payment_service::map_payment_write)?
            .ok_or_else(payment_not_found)?;

        let notice = AdminNotice::new(
            "Pembayaran SPP Diperbarui",
            format!(
                "Pembayaran SPP {} berhasil diperbarui",
                html_escape(&BillingMonth::from(&payment).label())
            ),
            NotificationKind::Info,
        );
        notify_admins(conn, &notice.by(actor(&user)))?;
        Ok(payment)
    })?;

    tracing::info!(payment_id = payment.id, "spp payment updated");
    Ok(Json(ApiResponse::ok(payment)))
}

// --- DELETE /api/spp/:id ---

pub async fn delete_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let mut conn = get_conn(&state.db)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let payment = diesel::delete(spp_payments::table.find(id))
            .get_result::<SppPayment>(conn)
            .optional()?
            .ok_or_else(payment_not_found)?;

        let notice = AdminNotice::new(
            "Pembayaran SPP Dihapus",
            format!(
                "Pembayaran SPP {} berhasil dihapus",
                html_escape(&BillingMonth::from(&payment).label())
            ),
            NotificationKind::Warning,
        );
        notify_admins(conn, &notice.by(actor(&user)))?;
        Ok(())
    })?;

    tracing::info!(payment_id = id, "spp payment deleted");
    Ok(Json(ApiResponse::ok(Deleted { id })))
}
