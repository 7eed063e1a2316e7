use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use taskgate_core::AppError;
use tracing::error;
use ts_rs::TS;

/// Body returned for internal errors; storage and driver details stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// API error payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/error-response.ts"
)]
pub struct ErrorResponse {
    message: String,
}

/// Full error text attached to error responses so middleware can read it without the body.
///
/// For internal errors this carries the detail the client body omits.
#[derive(Debug, Clone)]
pub struct ErrorMessage(pub String);

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.0.to_string();
        let public_message = match &self.0 {
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed with an internal error");
                INTERNAL_ERROR_MESSAGE.to_owned()
            }
            _ => message.clone(),
        };
        let mut response = (
            status,
            Json(ErrorResponse {
                message: public_message,
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorMessage(message));

        response
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
