use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "siakad_session";

/// Role name that grants access to user/role management and receives notifications.
pub const ADMIN_ROLE: &str = "admin";

/// Environment variable holding the HS256 secret for session tokens.
pub const SESSION_SECRET_ENV: &str = "SIAKAD_SESSION_SECRET";

/// Development fallback; refused when running in production.
pub const DEFAULT_SESSION_SECRET: &str = "development-secret-change-in-production";

/// Identity stored in the session cookie.
///
/// Field names on the wire match what the admin frontend reads
/// (`sessionId`, `loginTimestamp`); `iat`/`exp` bound the token lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    /// Unix milliseconds of the successful login.
    #[serde(rename = "loginTimestamp")]
    pub login_timestamp: i64,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: role.into(),
            session_id: Uuid::new_v4(),
            login_timestamp: now.timestamp_millis(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }
}

/// Signed-in user, resolved from a verified session cookie.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }
}

impl From<SessionClaims> for AuthUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            session_id: claims.session_id,
        }
    }
}

/// The process-wide session secret; `main` exports the configured value into the environment.
pub fn session_secret() -> String {
    std::env::var(SESSION_SECRET_ENV).unwrap_or_else(|_| DEFAULT_SESSION_SECRET.to_string())
}

/// Find a cookie value across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value that stores the session token.
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn claims_serialize_with_frontend_field_names() {
        let claims = SessionClaims::new(3, "Siti", "siti@sekolah.id", "admin", 3600);
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["id"], 3);
        assert!(json.get("sessionId").is_some());
        assert!(json.get("loginTimestamp").is_some());
        assert_eq!(json["exp"].as_i64().unwrap() - json["iat"].as_i64().unwrap(), 3600);
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let claims = SessionClaims::new(1, "a", "a@b.c", "Admin", 60);
        assert!(claims.is_admin());
        let claims = SessionClaims::new(1, "a", "a@b.c", "operator", 60);
        assert!(!claims.is_admin());
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; siakad_session=abc.def"));
        headers.append(header::COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(cookie_value(&headers, SESSION_COOKIE), Some("abc.def"));
        assert_eq!(cookie_value(&headers, "other"), Some("1"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = clear_session_cookie(true);
        assert!(cookie.starts_with("siakad_session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.ends_with("; Secure"));
    }
}
