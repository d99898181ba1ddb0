pub mod academic_years;
pub mod auth;
pub mod class_levels;
pub mod classrooms;
pub mod dashboard;
pub mod enrollment;
pub mod health;
pub mod ledger;
pub mod notifications;
pub mod payments;
pub mod rate_limit;
pub mod roles;
pub mod students;
pub mod teachers;
pub mod upload;
pub mod users;

use siakad_shared::clients::db::is_unique_violation;
use siakad_shared::errors::{AppError, ErrorCode};
use siakad_shared::types::session::AuthUser;

/// Name used to attribute notifications to the signed-in user.
pub(crate) fn actor(user: &AuthUser) -> Option<&str> {
    Some(user.name.as_str())
}

/// Map a unique-constraint violation to `code`, keep anything else as a database error.
pub(crate) fn on_conflict(code: ErrorCode, message: &'static str) -> impl FnOnce(diesel::result::Error) -> AppError {
    move |err| {
        if is_unique_violation(&err) {
            AppError::new(code, message)
        } else {
            AppError::Database(err)
        }
    }
}

/// Map a foreign-key violation (row still referenced) to a 400 with `message`.
pub(crate) fn still_referenced(message: &'static str) -> impl FnOnce(diesel::result::Error) -> AppError {
    move |err| {
        if siakad_shared::clients::db::is_foreign_key_violation(&err) {
            AppError::bad_request(message)
        } else {
            AppError::Database(err)
        }
    }
}
