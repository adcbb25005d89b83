use crate::{api::AppState, GIT_COMMIT_HASH};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses (
        (status = 200, description = "Service is healthy", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => {
            let acquire_span = info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            );
            match pool.acquire().instrument(acquire_span).await {
                Ok(mut conn) => match conn.ping().await {
                    Ok(()) => "ok",
                    Err(err) => {
                        error!("Failed to ping database: {}", err);
                        "error"
                    }
                },
                Err(err) => {
                    error!("Failed to acquire database connection: {}", err);
                    "error"
                }
            }
        }
        None => "memory",
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    };

    let short_hash = health.commit.get(..7).unwrap_or_default();

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            debug!("X-App header: {:?}", value);
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    let status = if database == "error" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, headers, Json(health))
}
