use crate::auth::CredentialService;
use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    store: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Account store is healthy", body = [Health]),
        (status = 503, description = "Account store is unhealthy", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(
    method: Method,
    service: Extension<Arc<CredentialService>>,
) -> impl IntoResponse {
    let store_ok = match service.store_ping().await {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to ping account store: {err}");
            false
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: if store_ok {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(x_app) => {
            debug!("X-App header: {x_app:?}");
            headers.insert("X-App", x_app);
        }
        Err(err) => error!("Failed to parse X-App header: {err}"),
    }

    if store_ok {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
