use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ai_reader::AiReadError;
use crate::services::sheet_decode::DecodeError;
use crate::services::sheet_reading::ReadError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sheet_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    /// A code read from a sheet that matches no registered sheet.
    UnknownSheetCode(String),
    /// The AI reply could not be used; carries the raw reply when there is one.
    AiReply { detail: String, raw_response: Option<String> },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub(crate) fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnknownSheetCode(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::AiReply { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Unsupported => ApiError::BadRequest(DecodeError::Unsupported.to_string()),
            DecodeError::Image(image::ImageError::Unsupported(_)) => {
                ApiError::BadRequest(DecodeError::Unsupported.to_string())
            }
            other => ApiError::internal(&other, "Failed to decode uploaded sheet"),
        }
    }
}

impl From<AiReadError> for ApiError {
    fn from(err: AiReadError) -> Self {
        if let AiReadError::Service(cause) = &err {
            tracing::error!(error = %cause, "AI sheet reading failed");
            return ApiError::AiReply {
                detail: "Error processing image with AI".to_string(),
                raw_response: None,
            };
        }

        tracing::warn!(error = %err, "AI reply rejected");
        ApiError::AiReply {
            detail: err.to_string(),
            raw_response: err.raw_response().map(str::to_string),
        }
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Quality(reason) => ApiError::Unprocessable(reason.to_string()),
            ReadError::Ai(err) => err.into(),
            other => ApiError::internal(&other, "Failed to process answer sheet"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (detail, sheet_code, raw_response) = match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::Unprocessable(message) => (message, None, None),
            ApiError::UnknownSheetCode(code) => {
                (format!("Sheet code '{code}' is not recognized"), Some(code), None)
            }
            ApiError::AiReply { detail, raw_response } => (detail, None, raw_response),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (message, None, None)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail, sheet_code, raw_response }))
            .into_response()
    }
}
