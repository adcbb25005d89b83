use super::Message;
use crate::{api::AppState, auth::ApiKeyRequest};
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessGranted {
    pub message: String,
    pub user: String,
}

#[utoipa::path(
    get,
    path = "/api/sentinel-key",
    params(
        ("X-API-KEY" = Option<String>, Header, description = "API key (header name is configurable)"),
        ("api_key" = Option<String>, Query, description = "API key when no header is sent")
    ),
    responses (
        (status = 200, description = "Key accepted", body = AccessGranted),
        (status = 403, description = "Missing, invalid or refused key", body = Message)
    ),
    tag = "sentinel"
)]
// axum handler for the protected resource
pub async fn resource(state: Extension<Arc<AppState>>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, _body) = request.into_parts();
    let api_request = ApiKeyRequest::from_parts(&parts, peer, state.trust_forwarded_for);

    if !state.pipeline.applies(&api_request) {
        return unauthorized();
    }

    // Every refusal looks the same to the client; the reason is only audited.
    match state.pipeline.authenticate(&api_request).await {
        Ok(principal) => Json(AccessGranted {
            message: "Access granted!".to_string(),
            user: principal.display_name,
        })
        .into_response(),
        Err(_) => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (StatusCode::FORBIDDEN, Json(Message::new("Unauthorized"))).into_response()
}
