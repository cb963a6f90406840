use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// API error that converts to a proper HTTP response
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Maps compiler and store errors onto the HTTP surface: configuration
/// faults are the caller's, storage misses are not-found, everything
/// else is internal.
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => ApiError::not_found(err.to_string()),
            Error::PipelineExists => ApiError::conflict(err.to_string()),
            e if e.is_client_error() => ApiError::bad_request(e.to_string()),
            e => ApiError::internal(e.to_string()),
        }
    }
}

/// Serializes a payload per the `output` query parameter: `json` for a
/// JSON body, anything else (or nothing) for YAML.
pub fn write_output<T: Serialize>(payload: &T, output: Option<&str>) -> Result<Response, ApiError> {
    match output {
        Some("json") => Ok(Json(serde_json::to_value(payload).map_err(|e| {
            ApiError::internal(format!("unable to encode response: {e}"))
        })?)
        .into_response()),
        _ => {
            let body = serde_yaml::to_string(payload)
                .map_err(|e| ApiError::internal(format!("unable to encode response: {e}")))?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/x-yaml")],
                body,
            )
                .into_response())
        }
    }
}
