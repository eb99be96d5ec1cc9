use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

/// Everything the paste lifecycle can fail with.
#[derive(Debug, thiserror::Error)]
pub enum PasteError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("encrypted content exceeds {} KiB limit", crate::lifecycle::MAX_CONTENT_BYTES / 1024)]
    PayloadTooLarge,
    #[error("paste not found")]
    NotFound,
    #[error("paste expired")]
    Expired,
    #[error("no free short id after {} attempts", crate::ids::MAX_SHORT_ID_ATTEMPTS)]
    IdentifierExhausted,
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl From<StoreError> for PasteError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Backend(e) => Self::Storage(e),
            other => Self::Storage(other.into()),
        }
    }
}

impl PasteError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::PayloadTooLarge => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Expired => StatusCode::GONE,
            Self::IdentifierExhausted | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PasteError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // Full chain goes to the log only.
            tracing::error!(error = %self, "internal error");
            "internal server error".to_owned()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
