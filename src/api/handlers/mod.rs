pub mod admin;
pub mod health;
pub mod resource;

use crate::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Map lifecycle errors onto HTTP statuses for the admin surface.
pub(crate) fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::OwnerConflict(_) => StatusCode::CONFLICT,
        Error::NoSecretConfigured | Error::CryptoUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidConfig(_)
        | Error::DecryptionFailed
        | Error::Storage(_)
        | Error::Cache(_) => {
            error!("Admin operation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(Message::new(err.to_string()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn maps_errors_to_statuses() {
        assert_eq!(error_response(&Error::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_response(&Error::OwnerConflict(Uuid::nil())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(&Error::CryptoUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_response(&Error::Storage("down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
