use chrono::NaiveDate;
use diesel::dsl::sql;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::Serialize;

use siakad_shared::errors::{AppError, AppResult};

use crate::schema::{expenses, incomes, spp_payments};

/// Half-open date range `[start, end)` covering a year or one month of it.
pub fn period_range(year: i32, month: Option<u32>) -> AppResult<(NaiveDate, NaiveDate)> {
    let invalid = || AppError::incomplete("Periode tidak valid");
    match month {
        None => {
            let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(invalid)?;
            Ok((start, end))
        }
        Some(m) if (1..=12).contains(&m) => {
            let start = NaiveDate::from_ymd_opt(year, m, 1).ok_or_else(invalid)?;
            let end = if m == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(year, m + 1, 1)
            }
            .ok_or_else(invalid)?;
            Ok((start, end))
        }
        Some(_) => Err(AppError::incomplete("Bulan harus antara 1 dan 12")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinanceSummary {
    pub year: i32,
    pub total_income: i64,
    pub total_expense: i64,
    /// SPP amount plus infaq.
    pub total_spp: i64,
    pub balance: i64,
}

impl FinanceSummary {
    pub fn new(year: i32, total_income: i64, total_expense: i64, total_spp: i64) -> Self {
        Self {
            year,
            total_income,
            total_expense,
            total_spp,
            balance: total_income + total_spp - total_expense,
        }
    }
}

pub fn summary(conn: &mut PgConnection, year: i32) -> AppResult<FinanceSummary> {
    let (start, end) = period_range(year, None)?;

    let total_income = incomes::table
        .filter(incomes::transaction_date.ge(start))
        .filter(incomes::transaction_date.lt(end))
        .select(sql::<BigInt>("COALESCE(SUM(amount), 0)::bigint"))
        .get_result::<i64>(conn)?;
    let total_expense = expenses::table
        .filter(expenses::transaction_date.ge(start))
        .filter(expenses::transaction_date.lt(end))
        .select(sql::<BigInt>("COALESCE(SUM(amount), 0)::bigint"))
        .get_result::<i64>(conn)?;
    let total_spp = spp_payments::table
        .filter(spp_payments::year.eq(year))
        .select(sql::<BigInt>("COALESCE(SUM(amount + COALESCE(infaq, 0)), 0)::bigint"))
        .get_result::<i64>(conn)?;

    Ok(FinanceSummary::new(year, total_income, total_expense, total_spp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn whole_year() {
        assert_eq!(period_range(2025, None).unwrap(), (date(2025, 1, 1), date(2026, 1, 1)));
    }

    #[test]
    fn single_month_and_december() {
        assert_eq!(period_range(2025, Some(2)).unwrap(), (date(2025, 2, 1), date(2025, 3, 1)));
        assert_eq!(period_range(2025, Some(12)).unwrap(), (date(2025, 12, 1), date(2026, 1, 1)));
        assert!(period_range(2025, Some(13)).is_err());
        assert!(period_range(2025, Some(0)).is_err());
    }

    #[test]
    fn balance_counts_spp_as_income() {
        let s = FinanceSummary::new(2025, 1_000_000, 400_000, 250_000);
        assert_eq!(s.balance, 850_000);
    }
}
