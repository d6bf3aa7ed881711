//! Mapping of core errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::CoreError;
use tracing::error;

/// Handler error; renders the JSON error envelope.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    /// A guarded transition found the row already moved on.
    AlreadyProcessed,
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let e = match self {
            ApiError::Core(e) => e,
            ApiError::AlreadyProcessed => return StatusCode::CONFLICT,
        };
        match e {
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::AlreadyExists
            | CoreError::DuplicateKeyword
            | CoreError::DuplicateShare
            | CoreError::DuplicateEditRequest => StatusCode::CONFLICT,
            CoreError::ShareLimitReached
            | CoreError::RecipientLimitReached
            | CoreError::PendingRequestLimit
            | CoreError::RecipientHasKeyword
            | CoreError::InvalidKeyword(_)
            | CoreError::InvalidUrl(_)
            | CoreError::InvalidInput(_)
            | CoreError::FeatureDisabled(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller; storage details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ApiError::Core(CoreError::Repository(_)) => "internal error".into(),
            ApiError::Core(other) => other.to_string(),
            ApiError::AlreadyProcessed => "already processed".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Core(e @ CoreError::Repository(_)) = &self {
            error!(err = ?e, "request failed");
        }
        (status, Json(http_common::json_error(&self.message()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
