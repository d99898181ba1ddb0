use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::types::session::{cookie_value, session_secret, AuthUser, SessionClaims, SESSION_COOKIE};

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, SESSION_COOKIE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "Silakan login terlebih dahulu"))?;

        let claims = verify_session(token, &session_secret())?;
        Ok(AuthUser::from(claims))
    }
}

/// Sign session claims into the cookie token.
pub fn sign_session(claims: &SessionClaims, secret: &str) -> AppResult<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("gagal membuat sesi: {e}")))
}

/// Verify a session token's signature and expiry.
pub fn verify_session(token: &str, secret: &str) -> AppResult<SessionClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::SessionExpired, "Sesi telah berakhir, silakan login kembali")
        }
        _ => AppError::new(ErrorCode::SessionInvalid, "Sesi tidak valid"),
    })?;

    if token_data.claims.is_expired() {
        return Err(AppError::new(ErrorCode::SessionExpired, "Sesi telah berakhir, silakan login kembali"));
    }

    Ok(token_data.claims)
}

/// Optional session extractor
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(_) => Ok(Self(None)),
        }
    }
}

/// Require the admin role
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::new(ErrorCode::Forbidden, "Hanya admin yang dapat mengakses fitur ini"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Request, StatusCode};

    async fn extract<T>(cookie: Option<String>) -> Result<T, AppError>
    where
        T: FromRequestParts<(), Rejection = AppError>,
    {
        let mut builder = Request::builder().uri("/api/auth/me");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        T::from_request_parts(&mut parts, &()).await
    }

    fn cookie_for(role: &str, ttl: i64) -> String {
        let claims = SessionClaims::new(9, "Rahmat", "rahmat@sekolah.id", role, ttl);
        let token = sign_session(&claims, &session_secret()).unwrap();
        format!("{SESSION_COOKIE}={token}")
    }

    #[test]
    fn roundtrip_session() {
        let claims = SessionClaims::new(1, "Ani", "ani@sekolah.id", "admin", 600);
        let token = sign_session(&claims, "secret-a").unwrap();
        assert_eq!(verify_session(&token, "secret-a").unwrap(), claims);
    }

    #[test]
    fn other_secret_rejects() {
        let claims = SessionClaims::new(1, "Ani", "ani@sekolah.id", "admin", 600);
        let token = sign_session(&claims, "secret-a").unwrap();
        let err = verify_session(&token, "secret-b").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::SessionInvalid);
    }

    #[test]
    fn expired_session_rejects() {
        let claims = SessionClaims::new(1, "Ani", "ani@sekolah.id", "admin", -3600);
        let token = sign_session(&claims, "secret-a").unwrap();
        let err = verify_session(&token, "secret-a").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::SessionExpired);
    }

    #[tokio::test]
    async fn missing_cookie_is_unauthorized() {
        let err = extract::<AuthUser>(None).await.unwrap_err();
        assert_eq!(err.error_code().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_cookie_yields_user() {
        let user = extract::<AuthUser>(Some(cookie_for("operator", 600))).await.unwrap();
        assert_eq!(user.id, 9);
        assert_eq!(user.name, "Rahmat");
    }

    #[tokio::test]
    async fn admin_extractor_checks_role() {
        let err = extract::<AdminUser>(Some(cookie_for("operator", 600)))
            .await
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::Forbidden);

        let admin = extract::<AdminUser>(Some(cookie_for("admin", 600))).await.unwrap();
        assert!(admin.0.is_admin());
    }

    #[tokio::test]
    async fn optional_extractor_never_rejects() {
        let OptionalAuthUser(user) = extract::<OptionalAuthUser>(Some("siakad_session=garbage".into()))
            .await
            .unwrap();
        assert!(user.is_none());
    }
}
