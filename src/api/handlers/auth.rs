//! Credential endpoints: register, login, logout, password recovery, profile.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::{
    clear_session_cookie, failure_response, require_session, session_headers,
};
use crate::auth::{
    service::{
        ChangePasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
        UpdateProfileRequest,
    },
    Authenticated, CredentialService,
};
use crate::store::Account;

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
    #[schema(value_type = String)]
    pub password: secrecy::SecretString,
    /// Avatar image payload, e.g. a data URL.
    pub avatar: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginBody {
    pub email: String,
    #[schema(value_type = String)]
    pub password: secrecy::SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordBody {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetPasswordBody {
    pub token: String,
    #[schema(value_type = String)]
    pub password: secrecy::SecretString,
    #[schema(value_type = String)]
    pub confirm_password: secrecy::SecretString,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ChangePasswordBody {
    #[schema(value_type = String)]
    pub current_password: secrecy::SecretString,
    #[schema(value_type = String)]
    pub password: secrecy::SecretString,
    #[schema(value_type = String)]
    pub confirm_password: secrecy::SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateProfileBody {
    pub name: String,
    /// New avatar payload; omit to keep the current one.
    pub avatar: Option<String>,
}

/// Public view of an account. Never carries the secret digest.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role.as_str().to_string(),
            avatar_url: account.avatar.as_ref().map(|asset| asset.url.clone()),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at_unix: i64,
    pub account: AccountResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Session cookie plus JSON body for endpoints that end logged in.
fn authenticated_response(
    service: &CredentialService,
    authenticated: &Authenticated,
    status: StatusCode,
) -> axum::response::Response {
    let headers = session_headers(service.config(), &authenticated.session.token);
    let body = SessionResponse {
        token: authenticated.session.token.clone(),
        expires_at_unix: authenticated.session.expires_at.timestamp(),
        account: AccountResponse::from(&authenticated.account),
    };
    (status, headers, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterBody,
    responses(
        (status = 201, description = "Account created and logged in", body = SessionResponse),
        (status = 400, description = "Missing or malformed fields"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<RegisterBody>,
) -> impl IntoResponse {
    let request = RegisterRequest {
        name: body.name,
        email: body.email,
        secret: body.password,
        avatar: body.avatar,
    };
    match service.register(request).await {
        Ok(authenticated) => authenticated_response(&service, &authenticated, StatusCode::CREATED),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<LoginBody>,
) -> impl IntoResponse {
    let request = LoginRequest {
        email: body.email,
        secret: body.password,
    };
    match service.login(request).await {
        Ok(authenticated) => authenticated_response(&service, &authenticated, StatusCode::OK),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
) -> impl IntoResponse {
    if let Some(token) = super::extract_session_token(&headers) {
        if let Err(failure) = service.logout(&token).await {
            error!("Failed to delete session: {failure}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(service.config()) {
        response_headers.insert(axum::http::header::SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordBody,
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 404, description = "No account with this email"),
        (status = 500, description = "Reset mail could not be delivered")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<ForgotPasswordBody>,
) -> impl IntoResponse {
    match service.forgot_password(&body.email).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Reset link sent".to_string(),
            }),
        )
            .into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordBody,
    responses(
        (status = 200, description = "Password replaced and logged in", body = SessionResponse),
        (status = 400, description = "Invalid, expired or already used token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<ResetPasswordBody>,
) -> impl IntoResponse {
    let request = ResetPasswordRequest {
        token: body.token,
        new_secret: body.password,
        confirm_secret: body.confirm_password,
    };
    match service.reset_password(request).await {
        Ok(authenticated) => authenticated_response(&service, &authenticated, StatusCode::OK),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/change",
    request_body = ChangePasswordBody,
    responses(
        (status = 200, description = "Password replaced, fresh session issued", body = SessionResponse),
        (status = 401, description = "Missing session or wrong current password")
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<ChangePasswordBody>,
) -> impl IntoResponse {
    use secrecy::ExposeSecret;

    let account = match require_session(&headers, &service).await {
        Ok(account) => account,
        Err(status) => return status.into_response(),
    };
    if body.password.expose_secret() != body.confirm_password.expose_secret() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let request = ChangePasswordRequest {
        account_id: account.id,
        current_secret: body.current_password,
        new_secret: body.password,
    };
    match service.change_password(request).await {
        Ok(authenticated) => authenticated_response(&service, &authenticated, StatusCode::OK),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The authenticated account", body = AccountResponse),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
) -> impl IntoResponse {
    match require_session(&headers, &service).await {
        Ok(account) => (StatusCode::OK, Json(AccountResponse::from(&account))).into_response(),
        Err(status) => status.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = UpdateProfileBody,
    responses(
        (status = 200, description = "Profile updated", body = AccountResponse),
        (status = 400, description = "Invalid update payload"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "me"
)]
pub async fn update_profile(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
    Json(body): Json<UpdateProfileBody>,
) -> impl IntoResponse {
    let account = match require_session(&headers, &service).await {
        Ok(account) => account,
        Err(status) => return status.into_response(),
    };
    let request = UpdateProfileRequest {
        account_id: account.id,
        name: body.name,
        avatar: body.avatar,
    };
    match service.update_profile(request).await {
        Ok(updated) => (StatusCode::OK, Json(AccountResponse::from(&updated))).into_response(),
        Err(failure) => failure_response(&failure),
    }
}
