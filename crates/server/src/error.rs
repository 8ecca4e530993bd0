use std::future::Future;

use axum::{
    extract::rejection::JsonRejection,
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use quire_common::protocol::compile::CompileErrorBody;
use tracing::error;
use uuid::Uuid;

use crate::compile::CompileError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    PayloadTooLarge,
    NotFound,
    CompileFailed,
    CompileTimeout,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::NotFound => "NOT_FOUND",
            Self::CompileFailed => "COMPILE_FAILED",
            Self::CompileTimeout => "COMPILE_TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::CompileFailed => StatusCode::BAD_REQUEST,
            Self::CompileTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::PayloadTooLarge => "payload exceeds maximum allowed size",
            Self::NotFound => "requested resource not found",
            Self::CompileFailed => "Unknown compilation error",
            Self::CompileTimeout => "compilation timed out",
            Self::InternalError => "internal server error",
        }
    }
}

/// Error returned by HTTP handlers. Renders as
/// `{ "error": true, "message", "code", "request_id" }`.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(default_code_for_status(status), message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CompileError> for ApiError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Rejected { message, .. } => Self::new(ErrorCode::CompileFailed, message),
            CompileError::TimedOut(_) => Self::new(ErrorCode::CompileTimeout, err.to_string()),
            CompileError::Launch { .. } | CompileError::Io { .. } => {
                error!(error = %err, "compile infrastructure failure");
                Self::new(ErrorCode::InternalError, err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let code = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ErrorCode::PayloadTooLarge,
            _ => ErrorCode::ValidationFailed,
        };
        Self::new(code, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);
        let body = CompileErrorBody {
            error: true,
            message: self.message,
            code: Some(self.code.as_str().to_owned()),
            request_id: request_id.clone(),
        };

        let mut response = (self.code.status(), Json(body)).into_response();
        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }
        response
    }
}

pub fn default_code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNPROCESSABLE_ENTITY
        | StatusCode::UNSUPPORTED_MEDIA_TYPE => ErrorCode::ValidationFailed,
        StatusCode::PAYLOAD_TOO_LARGE => ErrorCode::PayloadTooLarge,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::GATEWAY_TIMEOUT => ErrorCode::CompileTimeout,
        _ => ErrorCode::InternalError,
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use super::{with_request_id_scope, ApiError, ErrorCode};
    use crate::compile::CompileError;

    async fn body_json(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        (status, serde_json::from_slice(&body).expect("error response body should be valid json"))
    }

    #[tokio::test]
    async fn api_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            ApiError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-request-id"], "req-scoped-123");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], true);
        assert_eq!(parsed["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["request_id"], "req-scoped-123");
    }

    #[tokio::test]
    async fn rejected_document_is_bad_request_with_verbatim_diagnostics() {
        let diagnostics = "! Missing $ inserted.\n<inserted text>\n";
        let error = ApiError::from(CompileError::Rejected {
            message: diagnostics.to_owned(),
            exit_code: Some(1),
        });
        let (status, body) = body_json(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], diagnostics);
        assert_eq!(body["code"], "COMPILE_FAILED");
    }

    #[tokio::test]
    async fn timeout_maps_to_gateway_timeout() {
        let (status, body) =
            body_json(ApiError::from(CompileError::TimedOut(Duration::from_secs(60)))).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["code"], "COMPILE_TIMEOUT");
    }

    #[tokio::test]
    async fn launch_failure_maps_to_internal_error() {
        let error = CompileError::Launch {
            program: PathBuf::from("bin/tectonic"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let (status, body) = body_json(ApiError::from(error)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("bin/tectonic"));
    }

    #[tokio::test]
    async fn explicit_request_id_overrides_scope() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            ApiError::from_code(ErrorCode::NotFound)
                .with_request_id("req-explicit-456")
                .into_response()
        })
        .await;

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["request_id"], "req-explicit-456");
    }

    #[test]
    fn status_mapping_covers_client_errors() {
        assert_eq!(
            super::default_code_for_status(StatusCode::UNPROCESSABLE_ENTITY),
            ErrorCode::ValidationFailed
        );
        assert_eq!(
            super::default_code_for_status(StatusCode::PAYLOAD_TOO_LARGE),
            ErrorCode::PayloadTooLarge
        );
        assert_eq!(
            super::default_code_for_status(StatusCode::BAD_GATEWAY),
            ErrorCode::InternalError
        );
    }
}
