use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::middleware::sign_session;
use siakad_shared::types::session::SessionClaims;

use crate::models::{Role, User};
use crate::schema::{roles, users};

const INVALID_LOGIN: &str = "Email atau password salah";

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("gagal mengenkripsi password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("hash password tidak valid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::new(
            ErrorCode::PasswordTooWeak,
            format!("password minimal {MIN_PASSWORD_LEN} karakter"),
        ));
    }
    Ok(())
}

/// Look up a user by email and check the password.
///
/// Unknown emails and wrong passwords produce the same error.
pub fn authenticate(conn: &mut PgConnection, email: &str, password: &str) -> AppResult<(User, Role)> {
    let found: Option<(User, Role)> = users::table
        .inner_join(roles::table)
        .filter(users::email.eq(email.trim().to_lowercase()))
        .first::<(User, Role)>(conn)
        .optional()?;

    let (user, role) = found.ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials, INVALID_LOGIN))?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, INVALID_LOGIN));
    }

    Ok((user, role))
}

/// Build and sign the session for a freshly authenticated user.
pub fn start_session(user: &User, role: &Role, secret: &str, ttl_secs: i64) -> AppResult<(SessionClaims, String)> {
    let claims = SessionClaims::new(user.id, &user.name, &user.email, &role.name, ttl_secs);
    let token = sign_session(&claims, secret)?;
    Ok((claims, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use siakad_shared::middleware::verify_session;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("rahasia123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("rahasia123", &hash).unwrap());
        assert!(!verify_password("salah", &hash).unwrap());
    }

    #[test]
    fn short_password_is_rejected() {
        let err = validate_password("1234567").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PasswordTooWeak);
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn session_carries_user_and_role() {
        let user = User {
            id: 4,
            name: "Bu Rina".into(),
            email: "rina@sekolah.id".into(),
            password_hash: String::new(),
            role_id: 1,
            avatar_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let role = Role { id: 1, name: "admin".into(), description: None, created_at: Utc::now() };

        let (claims, token) = start_session(&user, &role, "s3cret", 600).unwrap();
        let verified = verify_session(&token, "s3cret").unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.role, "admin");
        assert_eq!(verified.email, "rina@sekolah.id");
    }
}
