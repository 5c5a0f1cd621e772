use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::page::{self, PageContext};

pub const NO_IMAGE_SELECTED: &str = "No Image Selected";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no file under the image field")]
    MissingUpload,
    #[error("rejected upload filename: {0}")]
    InvalidFilename(String),
    #[error("undecodable image: {0}")]
    InvalidImage(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("inference failed: {0}")]
    InferenceFailure(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Rendered like any other page, the way the form flow expects.
            ServiceError::MissingUpload => StatusCode::OK,
            ServiceError::InvalidFilename(_) | ServiceError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InferenceFailure(_) | ServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Never contains paths or library errors.
    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::MissingUpload => NO_IMAGE_SELECTED,
            ServiceError::InvalidFilename(_) => "The uploaded file name is not allowed",
            ServiceError::InvalidImage(_) => "The uploaded file is not a readable image",
            ServiceError::ModelUnavailable(_) => "The classification model is not available",
            ServiceError::InferenceFailure(_) => "The image could not be classified",
            ServiceError::BadRequest(_) => "The upload could not be read",
            ServiceError::Storage(_) => "The image could not be stored",
        }
    }

    fn log(&self) {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else if status.is_success() {
            tracing::debug!(error = %self, "request rejected");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        self.log();
        let context = PageContext {
            message: Some(self.user_message().to_string()),
            ..PageContext::default()
        };
        (self.status(), page::render_index(&context)).into_response()
    }
}

/// JSON rendering of a [`ServiceError`] for the machine-facing endpoints.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log();
        let body = serde_json::json!({
            "error": self.0.user_message(),
        });

        (self.0.status(), axum::Json(body)).into_response()
    }
}
