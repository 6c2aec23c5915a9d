use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::application::{convert::ConvertError, error::ErrorReport, webpage::types::WebRenderError};

/// Client-facing conversion failure. The response body carries a flat
/// `{"error": "..."}` envelope; the full source chain travels separately
/// through an [`ErrorReport`] so the logging middleware can emit it.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: StatusCode::BAD_REQUEST,
            report: ErrorReport::from_message(source, StatusCode::BAD_REQUEST, message.clone()),
            message,
        }
    }

    pub fn from_render(source: &'static str, error: WebRenderError) -> Self {
        let status = if error.is_input_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: error.to_string(),
            report: ErrorReport::from_error(source, status, &error),
        }
    }

    pub fn from_convert(source: &'static str, error: ConvertError) -> Self {
        let status = if error.is_input_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: error.to_string(),
            report: ErrorReport::from_error(source, status, &error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response =
            (self.status, Json(json!({ "error": self.message }))).into_response();
        self.report.attach(&mut response);
        response
    }
}
