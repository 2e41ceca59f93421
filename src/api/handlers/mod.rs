//! Shared handler plumbing: failure mapping, session cookies, auth guards.

pub mod admin;
pub mod auth;
pub mod health;
pub mod root;

use axum::{
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::auth::{AuthConfig, AuthFailure, CredentialService, SessionVerification};
use crate::store::{Account, Role};

pub const SESSION_COOKIE_NAME: &str = "konto_session";

/// Map a core failure to an HTTP response. Messages stay generic so the
/// status code is the only thing a caller learns.
pub fn failure_response(failure: &AuthFailure) -> Response {
    let status = match failure {
        AuthFailure::Validation(_) | AuthFailure::TokenInvalid => StatusCode::BAD_REQUEST,
        AuthFailure::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthFailure::NotFound => StatusCode::NOT_FOUND,
        AuthFailure::Conflict => StatusCode::CONFLICT,
        AuthFailure::Upstream(err) => {
            error!("Request failed: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": failure.to_string() }))).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Response headers carrying a freshly minted session cookie. An unparsable
/// cookie value is logged and dropped rather than failing the request.
pub(crate) fn session_headers(config: &AuthConfig, token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match session_cookie(config, token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    headers
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the caller's session or fail with `401`. Missing, unknown and
/// expired tokens all look the same from the outside.
pub(crate) async fn require_session(
    headers: &HeaderMap,
    service: &Arc<CredentialService>,
) -> Result<Account, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    match service.sessions().verify(&token).await {
        Ok(SessionVerification::Active(account)) => Ok(account),
        Ok(SessionVerification::Expired | SessionVerification::Invalid) => {
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(err) => {
            error!("Failed to verify session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Like [`require_session`], additionally requiring the admin role.
pub(crate) async fn require_admin(
    headers: &HeaderMap,
    service: &Arc<CredentialService>,
) -> Result<Account, StatusCode> {
    let account = require_session(headers, service).await?;
    if account.role == Role::Admin {
        Ok(account)
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).expect("header value"));
        headers
    }

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = headers_with(AUTHORIZATION, "Bearer abc123");
        headers.insert(
            COOKIE,
            HeaderValue::from_static("konto_session=fromcookie"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_token_is_found_among_other_cookies() {
        let headers = headers_with(COOKIE, "theme=dark; konto_session=tok; lang=en");
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn missing_token_yields_none() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
        let headers = headers_with(AUTHORIZATION, "Bearer ");
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_marks_secure_only_for_https() {
        let https = AuthConfig::new().with_frontend_base_url("https://app.example".to_string());
        let cookie = session_cookie(&https, "tok").expect("cookie");
        assert!(cookie.to_str().expect("str").contains("; Secure"));

        let http = AuthConfig::new().with_frontend_base_url("http://localhost:3000".to_string());
        let cookie = session_cookie(&http, "tok").expect("cookie");
        assert!(!cookie.to_str().expect("str").contains("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let config = AuthConfig::new();
        let cookie = clear_session_cookie(&config).expect("cookie");
        assert!(cookie.to_str().expect("str").contains("Max-Age=0"));
    }
}
