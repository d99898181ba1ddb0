use std::iter;

use chrono::{Datelike, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use siakad_shared::clients::db::is_unique_violation;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewSppPayment, SppPayment, Student};
use crate::schema::{spp_payments, students};
use crate::services::notification_service::{self, html_escape, AdminNotice, NotificationKind};

/// Billing years accepted anywhere in the SPP book.
pub const BILLING_YEARS: std::ops::RangeInclusive<i32> = 2000..=2100;

/// Upper bound on months generated in one request.
pub const MAX_MONTH_COUNT: u32 = 120;

const MONTH_NAMES: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni",
    "Juli", "Agustus", "September", "Oktober", "November", "Desember",
];

/// Indonesian name of a 1-based month.
pub fn month_name(month: i16) -> &'static str {
    usize::try_from(month - 1)
        .ok()
        .and_then(|i| MONTH_NAMES.get(i))
        .copied()
        .unwrap_or("?")
}

/// A (month, year) pair. As a generator cursor the month may be 0, meaning
/// "just before January".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BillingMonth {
    pub year: i32,
    pub month: i16,
}

impl BillingMonth {
    pub const fn new(month: i16, year: i32) -> Self {
        Self { year, month }
    }

    pub fn next(self) -> Self {
        if self.month >= 12 {
            Self::new(1, self.year.saturating_add(1))
        } else {
            Self::new(self.month + 1, self.year)
        }
    }

    pub fn label(&self) -> String {
        format!("{} {}", month_name(self.month), self.year)
    }
}

impl From<&SppPayment> for BillingMonth {
    fn from(p: &SppPayment) -> Self {
        Self::new(p.month, p.year)
    }
}

/// Body of `POST /api/spp/generate`.
///
/// Required fields are optional here so a missing one is reported with our
/// own message instead of a deserialisation rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateSppRequest {
    pub student_id: Option<i32>,
    #[serde(alias = "jumlah_bulan")]
    pub month_count: Option<u32>,
    #[serde(alias = "tanggal_bayar")]
    pub paid_at: Option<NaiveDate>,
    #[serde(alias = "nominal")]
    pub amount: Option<i64>,
    pub infaq: Option<i64>,
    /// Zero-based: 0 is January. Only used when the student has no payment yet.
    pub start_month: Option<i16>,
    pub start_year: Option<i32>,
}

/// A fully validated generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SppGeneration {
    pub student_id: i32,
    pub month_count: usize,
    pub paid_at: NaiveDate,
    pub amount: i64,
    pub infaq: Option<i64>,
    pub start: Option<(i16, i32)>,
}

impl GenerateSppRequest {
    pub fn validate_request(self) -> AppResult<SppGeneration> {
        let (Some(student_id), Some(month_count), Some(paid_at), Some(amount)) =
            (self.student_id, self.month_count.filter(|n| *n > 0), self.paid_at, self.amount)
        else {
            return Err(AppError::incomplete(
                "Data tidak lengkap: siswa, jumlah bulan, tanggal bayar dan nominal wajib diisi",
            ));
        };

        if month_count > MAX_MONTH_COUNT {
            return Err(AppError::incomplete(format!(
                "Jumlah bulan maksimal {MAX_MONTH_COUNT} per pembuatan"
            )));
        }

        if amount < 0 || self.infaq.is_some_and(|i| i < 0) {
            return Err(AppError::incomplete("Nominal dan infaq tidak boleh negatif"));
        }

        let start = match (self.start_month, self.start_year) {
            (Some(month), Some(year)) => {
                if !(0..=11).contains(&month) {
                    return Err(AppError::incomplete("Bulan mulai harus antara 0 (Januari) dan 11 (Desember)"));
                }
                if !BILLING_YEARS.contains(&year) {
                    return Err(year_out_of_range());
                }
                Some((month, year))
            }
            _ => None,
        };

        Ok(SppGeneration {
            student_id,
            month_count: month_count as usize,
            paid_at,
            amount,
            infaq: self.infaq,
            start,
        })
    }
}

fn year_out_of_range() -> AppError {
    AppError::incomplete(format!(
        "Tahun harus antara {} dan {}",
        BILLING_YEARS.start(),
        BILLING_YEARS.end()
    ))
}

/// Where counting starts: the last paid month, else the requested start,
/// else just before January of `current_year`.
pub fn starting_cursor(last_paid: Option<BillingMonth>, start: Option<(i16, i32)>, current_year: i32) -> BillingMonth {
    match (last_paid, start) {
        (Some(last), _) => last,
        (None, Some((zero_based_month, year))) => BillingMonth::new(zero_based_month, year),
        (None, None) => BillingMonth::new(0, current_year),
    }
}

/// The `count` months strictly after `cursor`, in order.
pub fn months_after(cursor: BillingMonth, count: usize) -> Vec<BillingMonth> {
    iter::successors(Some(cursor.next()), |m| Some(m.next()))
        .take(count)
        .collect()
}

/// Rows for the months after `cursor`. Fails when the run would leave the
/// accepted billing years.
pub fn plan_payments(order: &SppGeneration, cursor: BillingMonth) -> AppResult<Vec<NewSppPayment>> {
    let months = months_after(cursor, order.month_count);
    if months.iter().any(|m| !BILLING_YEARS.contains(&m.year)) {
        return Err(year_out_of_range());
    }
    Ok(months
        .into_iter()
        .map(|m| NewSppPayment {
            student_id: order.student_id,
            month: m.month,
            year: m.year,
            paid_at: order.paid_at,
            amount: order.amount,
            infaq: order.infaq,
        })
        .collect())
}

pub fn last_payment(conn: &mut PgConnection, student_id: i32) -> QueryResult<Option<SppPayment>> {
    spp_payments::table
        .filter(spp_payments::student_id.eq(student_id))
        .order((spp_payments::year.desc(), spp_payments::month.desc()))
        .first::<SppPayment>(conn)
        .optional()
}

#[derive(Debug, Serialize)]
pub struct GeneratedPayments {
    pub count: usize,
    pub payments: Vec<SppPayment>,
}

pub fn duplicate_payment() -> AppError {
    AppError::new(
        ErrorCode::DuplicatePayment,
        "Pembayaran SPP untuk bulan tersebut sudah tercatat",
    )
}

pub fn map_payment_write(err: diesel::result::Error) -> AppError {
    if is_unique_violation(&err) {
        duplicate_payment()
    } else {
        AppError::Database(err)
    }
}

fn generation_notice(student: &Student, inserted: &[SppPayment]) -> AdminNotice {
    let span = match (inserted.first(), inserted.last()) {
        (Some(first), Some(last)) if inserted.len() > 1 => format!(
            " ({} - {})",
            BillingMonth::from(first).label(),
            BillingMonth::from(last).label()
        ),
        (Some(only), _) => format!(" ({})", BillingMonth::from(only).label()),
        _ => String::new(),
    };
    AdminNotice::new(
        "Pembayaran SPP",
        format!(
            "Pembayaran SPP <strong>{}</strong> untuk {} bulan{} berhasil dicatat",
            html_escape(&student.name),
            inserted.len(),
            span
        ),
        NotificationKind::Success,
    )
}

/// Run the recurring payment generator for one student.
///
/// The student row is locked for the duration so concurrent generations for
/// the same student observe each other's rows.
pub fn generate(conn: &mut PgConnection, order: &SppGeneration, actor: Option<&str>) -> AppResult<GeneratedPayments> {
    conn.transaction::<_, AppError, _>(|conn| {
        let student = students::table
            .find(order.student_id)
            .for_update()
            .get_result::<Student>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::StudentNotFound, "Siswa tidak ditemukan"))?;

        let last = last_payment(conn, student.id)?.as_ref().map(BillingMonth::from);
        let cursor = starting_cursor(last, order.start, Utc::now().year());
        let rows = plan_payments(order, cursor)?;

        let inserted = diesel::insert_into(spp_payments::table)
            .values(&rows)
            .get_results::<SppPayment>(conn)
            .map_err(map_payment_write)?;

        notification_service::notify_admins(conn, &generation_notice(&student, &inserted).by(actor))?;

        tracing::info!(
            student_id = student.id,
            count = inserted.len(),
            from = ?cursor.next(),
            "spp payments generated"
        );

        Ok(GeneratedPayments {
            count: inserted.len(),
            payments: inserted,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(count: usize) -> SppGeneration {
        SppGeneration {
            student_id: 1,
            month_count: count,
            paid_at: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            amount: 150_000,
            infaq: Some(10_000),
            start: None,
        }
    }

    fn pairs(months: &[BillingMonth]) -> Vec<(i16, i32)> {
        months.iter().map(|m| (m.month, m.year)).collect()
    }

    #[test]
    fn continues_after_december() {
        for n in [1usize, 5, 12, 13, 25] {
            let months = months_after(BillingMonth::new(12, 2024), n);
            assert_eq!(months.len(), n);
            for (i, m) in months.iter().enumerate() {
                assert_eq!(m.month as usize, i % 12 + 1);
                assert_eq!(m.year, 2025 + (i / 12) as i32);
            }
            assert!(months.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn cold_start_uses_requested_start() {
        let cursor = starting_cursor(None, Some((3, 2024)), 2030);
        assert_eq!(pairs(&months_after(cursor, 2)), vec![(4, 2024), (5, 2024)]);
    }

    #[test]
    fn cold_start_without_start_begins_in_january() {
        let cursor = starting_cursor(None, None, 2026);
        assert_eq!(pairs(&months_after(cursor, 3)), vec![(1, 2026), (2, 2026), (3, 2026)]);
    }

    #[test]
    fn last_payment_wins_over_requested_start() {
        let cursor = starting_cursor(Some(BillingMonth::new(6, 2025)), Some((0, 2020)), 2026);
        assert_eq!(cursor, BillingMonth::new(6, 2025));
    }

    #[test]
    fn rolls_over_year_boundary() {
        let months = months_after(BillingMonth::new(11, 2023), 3);
        assert_eq!(pairs(&months), vec![(12, 2023), (1, 2024), (2, 2024)]);
    }

    #[test]
    fn planned_rows_copy_payment_details() {
        let rows = plan_payments(&order(2), BillingMonth::new(12, 2024)).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.student_id == 1 && r.amount == 150_000 && r.infaq == Some(10_000)));
        assert_eq!((rows[0].month, rows[0].year), (1, 2025));
        assert_eq!((rows[1].month, rows[1].year), (2, 2025));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = GenerateSppRequest::default().validate_request().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);

        let zero_months = GenerateSppRequest {
            student_id: Some(1),
            month_count: Some(0),
            paid_at: NaiveDate::from_ymd_opt(2025, 1, 1),
            amount: Some(100),
            ..Default::default()
        };
        assert!(zero_months.validate_request().is_err());
    }

    #[test]
    fn start_requires_both_parts_and_valid_month() {
        let base = GenerateSppRequest {
            student_id: Some(1),
            month_count: Some(2),
            paid_at: NaiveDate::from_ymd_opt(2025, 1, 1),
            amount: Some(100),
            ..Default::default()
        };

        let only_month = GenerateSppRequest { start_month: Some(3), ..base.clone() };
        assert_eq!(only_month.validate_request().unwrap().start, None);

        let both = GenerateSppRequest { start_month: Some(3), start_year: Some(2024), ..base.clone() };
        assert_eq!(both.validate_request().unwrap().start, Some((3, 2024)));

        let out_of_range = GenerateSppRequest { start_month: Some(12), start_year: Some(2024), ..base.clone() };
        assert!(out_of_range.validate_request().is_err());

        let negative = GenerateSppRequest { infaq: Some(-1), ..base };
        assert!(negative.validate_request().is_err());
    }

    #[test]
    fn start_year_outside_billing_years_is_rejected() {
        let base = GenerateSppRequest {
            student_id: Some(1),
            month_count: Some(2),
            paid_at: NaiveDate::from_ymd_opt(2025, 1, 1),
            amount: Some(100),
            start_month: Some(11),
            ..Default::default()
        };

        for year in [i32::MAX, -5, 1999, 2101] {
            let req = GenerateSppRequest { start_year: Some(year), ..base.clone() };
            let err = req.validate_request().unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::ValidationError, "{year}");
        }

        let edge = GenerateSppRequest { start_year: Some(2100), ..base };
        assert_eq!(edge.validate_request().unwrap().start, Some((11, 2100)));
    }

    #[test]
    fn plan_stops_at_last_billing_year() {
        let err = plan_payments(&order(2), BillingMonth::new(11, 2100)).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);

        let rows = plan_payments(&order(1), BillingMonth::new(11, 2100)).unwrap();
        assert_eq!((rows[0].month, rows[0].year), (12, 2100));
    }

    #[test]
    fn cursor_at_max_year_does_not_overflow() {
        let next = BillingMonth::new(12, i32::MAX).next();
        assert_eq!(next, BillingMonth::new(1, i32::MAX));
        assert!(plan_payments(&order(1), BillingMonth::new(12, i32::MAX)).is_err());
    }

    #[test]
    fn month_count_is_capped() {
        let req = |n: u32| GenerateSppRequest {
            student_id: Some(1),
            month_count: Some(n),
            paid_at: NaiveDate::from_ymd_opt(2025, 1, 1),
            amount: Some(100),
            ..Default::default()
        };

        assert_eq!(req(MAX_MONTH_COUNT).validate_request().unwrap().month_count, 120);
        for n in [MAX_MONTH_COUNT + 1, u32::MAX] {
            let err = req(n).validate_request().unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::ValidationError);
        }
    }

    #[test]
    fn accepts_indonesian_field_names() {
        let req: GenerateSppRequest = serde_json::from_value(serde_json::json!({
            "student_id": 7,
            "jumlah_bulan": 2,
            "tanggal_bayar": "2024-03-01",
            "nominal": 200000,
            "start_month": 3,
            "start_year": 2024
        }))
        .unwrap();
        let order = req.validate_request().unwrap();
        assert_eq!(order.month_count, 2);
        assert_eq!(order.amount, 200_000);
        assert_eq!(order.infaq, None);
    }

    #[test]
    fn month_names() {
        assert_eq!(month_name(1), "Januari");
        assert_eq!(month_name(12), "Desember");
        assert_eq!(month_name(0), "?");
        assert_eq!(BillingMonth::new(8, 2025).label(), "Agustus 2025");
    }
}
