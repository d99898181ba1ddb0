use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth and session errors
/// - E2xxx: Academic records (students, teachers, classrooms, history)
/// - E3xxx: Finance (SPP payments, incomes, expenses)
/// - E4xxx: Access control (roles, users)
/// - E5xxx: Notification errors
/// - E6xxx: Upload errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    BadRequest,
    PayloadTooLarge,

    // Auth (E1xxx)
    InvalidCredentials,
    SessionExpired,
    SessionInvalid,
    PasswordTooWeak,

    // Academic (E2xxx)
    StudentNotFound,
    TeacherNotFound,
    ClassLevelNotFound,
    AcademicYearNotFound,
    ClassroomNotFound,
    ClassHistoryNotFound,
    DuplicateNis,
    DuplicateNip,
    DuplicateClassroom,
    AlreadyInClassroom,

    // Finance (E3xxx)
    PaymentNotFound,
    DuplicatePayment,
    LedgerEntryNotFound,

    // Access control (E4xxx)
    RoleNotFound,
    RoleNameTaken,
    RoleInUse,
    UserNotFound,
    EmailAlreadyExists,
    CannotDeleteSelf,

    // Notification (E5xxx)
    NotificationNotFound,

    // Upload (E6xxx)
    UploadFailed,
    UnsupportedImageType,
    ImageTooLarge,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",
            Self::BadRequest => "E0007",
            Self::PayloadTooLarge => "E0008",

            // Auth
            Self::InvalidCredentials => "E1001",
            Self::SessionExpired => "E1002",
            Self::SessionInvalid => "E1003",
            Self::PasswordTooWeak => "E1004",

            // Academic
            Self::StudentNotFound => "E2001",
            Self::TeacherNotFound => "E2002",
            Self::ClassLevelNotFound => "E2003",
            Self::AcademicYearNotFound => "E2004",
            Self::ClassroomNotFound => "E2005",
            Self::ClassHistoryNotFound => "E2006",
            Self::DuplicateNis => "E2007",
            Self::DuplicateNip => "E2008",
            Self::DuplicateClassroom => "E2009",
            Self::AlreadyInClassroom => "E2010",

            // Finance
            Self::PaymentNotFound => "E3001",
            Self::DuplicatePayment => "E3002",
            Self::LedgerEntryNotFound => "E3003",

            // Access control
            Self::RoleNotFound => "E4001",
            Self::RoleNameTaken => "E4002",
            Self::RoleInUse => "E4003",
            Self::UserNotFound => "E4004",
            Self::EmailAlreadyExists => "E4005",
            Self::CannotDeleteSelf => "E4006",

            // Notification
            Self::NotificationNotFound => "E5001",

            // Upload
            Self::UploadFailed => "E6001",
            Self::UnsupportedImageType => "E6002",
            Self::ImageTooLarge => "E6003",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest | Self::PasswordTooWeak
            | Self::UploadFailed | Self::UnsupportedImageType => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge | Self::ImageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::StudentNotFound | Self::TeacherNotFound
            | Self::ClassLevelNotFound | Self::AcademicYearNotFound | Self::ClassroomNotFound
            | Self::ClassHistoryNotFound | Self::PaymentNotFound | Self::LedgerEntryNotFound
            | Self::RoleNotFound | Self::UserNotFound | Self::NotificationNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidCredentials | Self::SessionExpired
            | Self::SessionInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::CannotDeleteSelf => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // Conflicts are reported as plain bad requests.
            Self::DuplicateNis | Self::DuplicateNip | Self::DuplicateClassroom
            | Self::AlreadyInClassroom | Self::DuplicatePayment | Self::RoleNameTaken
            | Self::RoleInUse | Self::EmailAlreadyExists => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Fallback message for failures that carry no usable detail.
pub const GENERIC_FAILURE: &str = "Terjadi kesalahan pada server";

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Missing or malformed request fields, reported before any database access.
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// The error code this error will be reported with.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::InternalError,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(code = code.code(), error = %message, "request failed");
                }
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", GENERIC_FAILURE),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "Data tidak ditemukan"),
                    ),
                    other => {
                        let message = other.to_string();
                        let message = if message.is_empty() { GENERIC_FAILURE.to_string() } else { message };
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            ApiErrorResponse::new("E0001", message),
                        )
                    }
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn known_error_uses_code_and_status() {
        let (status, value) = body_json(AppError::new(
            ErrorCode::StudentNotFound,
            "Siswa tidak ditemukan",
        ))
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "E2001");
        assert_eq!(value["error"]["message"], "Siswa tidak ditemukan");
    }

    #[test]
    fn conflicts_are_bad_requests() {
        for code in [
            ErrorCode::DuplicateClassroom,
            ErrorCode::RoleInUse,
            ErrorCode::AlreadyInClassroom,
            ErrorCode::DuplicatePayment,
        ] {
            assert_eq!(code.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn database_error_surfaces_message() {
        let (status, value) = body_json(AppError::Database(
            diesel::result::Error::QueryBuilderError("kolom tidak dikenal".into()),
        ))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("kolom tidak dikenal"));
    }

    #[tokio::test]
    async fn database_not_found_is_404() {
        let (status, value) = body_json(AppError::Database(diesel::result::Error::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["error"]["code"], "E0003");
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let (status, value) = body_json(AppError::Internal(anyhow::anyhow!("secret detail"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value["error"]["message"], GENERIC_FAILURE);
    }

    #[test]
    fn rate_limited_is_429() {
        assert_eq!(ErrorCode::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::new(ErrorCode::RateLimited, "x").error_code(),
            ErrorCode::RateLimited
        );
    }
}
