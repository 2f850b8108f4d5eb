use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::InvalidInput;
use crate::services::approval::ApprovalError;
use crate::services::holidays::HolidayError;
use crate::services::scheduling::SchedulingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadGateway(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<InvalidInput> for AppError {
    fn from(e: InvalidInput) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<SchedulingError> for AppError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::InvalidInput(e) => e.into(),
            SchedulingError::OutsideWindows | SchedulingError::BlockedWindow { .. } => {
                AppError::Unprocessable(e.to_string())
            }
            SchedulingError::AlreadyBooked { .. } => AppError::Conflict(e.to_string()),
            SchedulingError::Store(e) => AppError::Internal(e),
        }
    }
}

impl From<ApprovalError> for AppError {
    fn from(e: ApprovalError) -> Self {
        match e {
            ApprovalError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            ApprovalError::MissingReason => AppError::BadRequest(e.to_string()),
            ApprovalError::NotFound => AppError::NotFound("booking".to_string()),
            ApprovalError::Store(e) => AppError::Internal(e),
        }
    }
}

impl From<HolidayError> for AppError {
    fn from(e: HolidayError) -> Self {
        match e {
            HolidayError::FetchFailed(_) | HolidayError::InvalidPayload(_) => {
                AppError::BadGateway(e.to_string())
            }
            HolidayError::Store(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
