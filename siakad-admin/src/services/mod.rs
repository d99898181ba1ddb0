pub mod auth_service;
pub mod enrollment_service;
pub mod finance_service;
pub mod notification_service;
pub mod payment_service;
pub mod rate_limiter;
pub mod upload_service;
