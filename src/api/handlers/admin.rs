//! Administrative key management, guarded by a bearer token.

use super::{error_response, Message};
use crate::{api::AppState, keys::ApiKeyRecord};
use axum::{
    extract::{Extension, Path},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct IssueKeyRequest {
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct IssuedKeyResponse {
    pub key: ApiKeyRecord,
    /// Shown once; later available through the reveal endpoint.
    pub raw_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevealedKey {
    pub raw_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct KeyStatus {
    pub key_id: Uuid,
    pub blocked: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnabledRequest {
    pub enabled: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Regenerated {
    pub regenerated: usize,
}

/// Compare digests so the comparison time does not depend on the common prefix.
fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_token.as_ref() else {
        return false;
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    presented.is_some_and(|token| {
        Sha256::digest(token.as_bytes()) == Sha256::digest(expected.expose_secret().as_bytes())
    })
}

fn reject() -> Response {
    warn!(target: "sentinel::audit", "Rejected admin request with missing or wrong token");
    (StatusCode::UNAUTHORIZED, Json(Message::new("Unauthorized"))).into_response()
}

#[utoipa::path(
    post,
    path = "/admin/owners/{owner_id}/key",
    params(("owner_id" = Uuid, Path, description = "Owner of the key")),
    request_body(content = IssueKeyRequest, description = "Optional absolute expiry"),
    responses (
        (status = 201, description = "Key issued", body = IssuedKeyResponse),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 503, description = "No master secret available", body = Message)
    ),
    tag = "admin"
)]
pub async fn issue(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(owner_id): Path<Uuid>,
    body: Option<Json<IssueKeyRequest>>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    let expires_at = body.and_then(|Json(body)| body.expires_at);
    match state.service.generate(owner_id, expires_at).await {
        Ok(issued) => (
            StatusCode::CREATED,
            Json(IssuedKeyResponse {
                key: issued.record,
                raw_key: issued.raw_key.expose_secret().to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/owners/{owner_id}/key",
    params(("owner_id" = Uuid, Path, description = "Owner of the key")),
    responses (
        (status = 204, description = "Key revoked"),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 404, description = "Owner has no key", body = Message)
    ),
    tag = "admin"
)]
pub async fn revoke(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(owner_id): Path<Uuid>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.revoke(owner_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(Message::new("not found"))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/admin/owners/{owner_id}/key/rotate",
    params(("owner_id" = Uuid, Path, description = "Owner of the key")),
    responses (
        (status = 200, description = "Key rotated", body = IssuedKeyResponse),
        (status = 401, description = "Missing or wrong admin token", body = Message)
    ),
    tag = "admin"
)]
pub async fn rotate(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(owner_id): Path<Uuid>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.rotate(owner_id).await {
        Ok(issued) => Json(IssuedKeyResponse {
            key: issued.record,
            raw_key: issued.raw_key.expose_secret().to_string(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/admin/owners/{owner_id}/key/reveal",
    params(("owner_id" = Uuid, Path, description = "Owner of the key")),
    responses (
        (status = 200, description = "Decrypted key", body = RevealedKey),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 404, description = "Owner has no key", body = Message)
    ),
    tag = "admin"
)]
pub async fn reveal(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(owner_id): Path<Uuid>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.reveal(owner_id).await {
        Ok(raw) => Json(RevealedKey {
            raw_key: raw.expose_secret().to_string(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/admin/keys/{key_id}/block",
    params(("key_id" = Uuid, Path, description = "Key identifier")),
    responses (
        (status = 200, description = "Blocked flag flipped", body = KeyStatus),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 404, description = "Unknown key", body = Message)
    ),
    tag = "admin"
)]
pub async fn toggle_block(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key_id): Path<Uuid>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.toggle_block(key_id).await {
        Ok(true) => status_response(&state, key_id).await,
        Ok(false) => (StatusCode::NOT_FOUND, Json(Message::new("not found"))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/admin/keys/{key_id}/enabled",
    params(("key_id" = Uuid, Path, description = "Key identifier")),
    request_body = EnabledRequest,
    responses (
        (status = 200, description = "Key updated", body = ApiKeyRecord),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 404, description = "Unknown key", body = Message)
    ),
    tag = "admin"
)]
pub async fn set_enabled(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key_id): Path<Uuid>,
    Json(body): Json<EnabledRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.set_enabled(key_id, body.enabled).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/admin/keys/{key_id}/status",
    params(("key_id" = Uuid, Path, description = "Key identifier")),
    responses (
        (status = 200, description = "Blocked flag", body = KeyStatus),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 404, description = "Unknown key", body = Message)
    ),
    tag = "admin"
)]
pub async fn status(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(key_id): Path<Uuid>,
) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    status_response(&state, key_id).await
}

async fn status_response(state: &AppState, key_id: Uuid) -> Response {
    match state.service.status_of(key_id).await {
        Ok(blocked) => Json(KeyStatus { key_id, blocked }).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/admin/regenerate",
    responses (
        (status = 200, description = "Every key regenerated", body = Regenerated),
        (status = 401, description = "Missing or wrong admin token", body = Message),
        (status = 503, description = "No master secret available", body = Message)
    ),
    tag = "admin"
)]
pub async fn regenerate(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return reject();
    }
    match state.service.force_regenerate_all().await {
        Ok(regenerated) => Json(Regenerated { regenerated }).into_response(),
        Err(err) => error_response(&err),
    }
}
