//! Admin-only account management endpoints.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{auth::AccountResponse, failure_response, require_admin};
use crate::auth::CredentialService;
use crate::store::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateRoleBody {
    /// "standard" or "admin".
    pub role: String,
}

#[utoipa::path(
    get,
    path = "/v1/admin/accounts",
    responses(
        (status = 200, description = "All accounts", body = [AccountResponse]),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn list_accounts(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &service).await {
        return status.into_response();
    }
    match service.list_accounts().await {
        Ok(accounts) => {
            let response: Vec<AccountResponse> =
                accounts.iter().map(AccountResponse::from).collect();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/accounts/{id}",
    params(
        ("id" = Uuid, Path, description = "Account id")
    ),
    responses(
        (status = 200, description = "The account", body = AccountResponse),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    ),
    tag = "admin"
)]
pub async fn get_account(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &service).await {
        return status.into_response();
    }
    match service.get_account(id).await {
        Ok(account) => (StatusCode::OK, Json(AccountResponse::from(&account))).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/admin/accounts/{id}/role",
    params(
        ("id" = Uuid, Path, description = "Account id")
    ),
    request_body = UpdateRoleBody,
    responses(
        (status = 200, description = "Role updated", body = AccountResponse),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    ),
    tag = "admin"
)]
pub async fn update_role(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRoleBody>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &service).await {
        return status.into_response();
    }
    let Some(role) = Role::parse(&body.role) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match service.update_role(id, role).await {
        Ok(account) => (StatusCode::OK, Json(AccountResponse::from(&account))).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/admin/accounts/{id}",
    params(
        ("id" = Uuid, Path, description = "Account id")
    ),
    responses(
        (status = 204, description = "Account and its sessions deleted"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    ),
    tag = "admin"
)]
pub async fn delete_account(
    headers: HeaderMap,
    service: Extension<Arc<CredentialService>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &service).await {
        return status.into_response();
    }
    match service.delete_account(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(&failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_role_body_parses_known_roles() {
        let body: UpdateRoleBody =
            serde_json::from_value(serde_json::json!({ "role": "admin" })).expect("parse body");
        assert_eq!(Role::parse(&body.role), Some(Role::Admin));
        assert_eq!(Role::parse("owner"), None);
    }
}
