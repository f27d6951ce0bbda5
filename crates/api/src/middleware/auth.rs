//! Username resolution for every API request.
//!
//! A trusted reverse proxy authenticates the browser and forwards the
//! identity in `x-forwarded-email`. Without the proxy the local OS user
//! applies, except for well-known system accounts which are always refused.

use crate::types::{error_response, ApiError};
use ai_thread_common::Username;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub const FORWARDED_EMAIL_HEADER: &str = "x-forwarded-email";

/// System accounts never accepted as a thread owner.
pub const FORBIDDEN_USERS: &[&str] = &[
    "root",
    "admin",
    "administrator",
    "system",
    "daemon",
    "nobody",
    "node",
    "app",
    "service",
    "docker",
    "www-data",
    "nginx",
    "apache",
    "ansible",
];

/// The authenticated caller, injected as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Username);

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let local_user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok();
    match resolve_username(request.headers(), local_user) {
        Ok(username) => {
            request.extensions_mut().insert(AuthUser(username));
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Pick the caller identity from the proxy header or the local OS user.
pub fn resolve_username(
    headers: &HeaderMap,
    local_user: Option<String>,
) -> Result<Username, ApiError> {
    if let Some(email) = headers
        .get(FORWARDED_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Ok(Username::from(email));
    }

    let local = local_user.ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "no authenticated user: missing x-forwarded-email and no local user",
        )
    })?;

    if FORBIDDEN_USERS.contains(&local.to_lowercase().as_str()) {
        warn!(user = %local, "refusing system account as thread owner");
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN_SYSTEM_ACCOUNT",
            format!("system account '{local}' cannot own threads"),
        ));
    }
    Ok(Username::from(local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_proxy_header_priority() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_EMAIL_HEADER,
            HeaderValue::from_static("alice@example.com"),
        );
        let user = resolve_username(&headers, Some("root".into())).unwrap();
        assert_eq!(user.as_str(), "alice@example.com");
    }

    #[test]
    fn test_local_user_fallback() {
        let user = resolve_username(&HeaderMap::new(), Some("alice".into())).unwrap();
        assert_eq!(user.as_str(), "alice");
    }

    #[test]
    fn test_system_accounts_refused() {
        for account in ["root", "Docker", "www-data"] {
            let result = resolve_username(&HeaderMap::new(), Some(account.into()));
            let (status, _) = result.unwrap_err();
            assert_eq!(status, StatusCode::FORBIDDEN, "account {account}");
        }
    }

    #[test]
    fn test_missing_identity_unauthenticated() {
        let (status, _) = resolve_username(&HeaderMap::new(), None).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
