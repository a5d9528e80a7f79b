use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::ai_extraction::ExtractionError;
use crate::services::attempt_finalize::AttemptError;
use crate::services::attempt_policy::StartDenied;
use crate::services::exam_engine::EngineError;
use crate::services::question_import::ImportError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    UnprocessableEntity(String),
    TooManyRequests(&'static str),
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    /// Store failures, with malformed documents logged separately from query errors.
    pub(crate) fn store(err: StoreError, context: &str) -> Self {
        if let StoreError::Decode(decode) = &err {
            metrics::counter!("decode_failures_total", "entity" => decode.entity).increment(1);
        }
        Self::internal(err, context)
    }

    fn parts(self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message),
            ApiError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::TooManyRequests(message) => {
                (StatusCode::TOO_MANY_REQUESTS, message.to_string())
            }
            ApiError::BadGateway(message) => {
                tracing::warn!(error = %message, "Upstream service failed");
                (StatusCode::BAD_GATEWAY, message)
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let challenge = matches!(self, ApiError::Unauthorized(_));
        let (status, detail) = self.parts();
        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if challenge {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::SectionOutOfRange(_)
            | EngineError::QuestionOutOfRange(_)
            | EngineError::InvalidOption(_) => ApiError::BadRequest(err.to_string()),
            EngineError::Finished
            | EngineError::SectionInProgress
            | EngineError::NoActiveSection
            | EngineError::SectionsPending { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<StartDenied> for ApiError {
    fn from(err: StartDenied) -> Self {
        match err {
            StartDenied::NotOpen => ApiError::Forbidden("This test is not available"),
            StartDenied::Empty
            | StartDenied::RetakeDisallowed
            | StartDenied::AttemptLimitReached { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::UnprocessableEntity(err.to_string())
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::NotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            ExtractionError::Invalid(inner) => inner.into(),
            ExtractionError::Malformed(_) => ApiError::UnprocessableEntity(err.to_string()),
            ExtractionError::Request(_)
            | ExtractionError::Upstream { .. }
            | ExtractionError::MissingContent => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::NotFound => ApiError::NotFound("Exam session not found".to_string()),
            AttemptError::Engine(inner) => inner.into(),
            AttemptError::Store(inner) => ApiError::store(inner, "Failed to update exam session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn engine_errors_map_to_client_errors() {
        assert_eq!(status_of(EngineError::InvalidOption(7)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(EngineError::SectionsPending { pending: 1 }), StatusCode::CONFLICT);
    }

    #[test]
    fn start_and_import_denials() {
        assert_eq!(status_of(StartDenied::NotOpen), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(StartDenied::AttemptLimitReached { max: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(ImportError::Empty), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(ExtractionError::NotConfigured), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(ExtractionError::MissingContent), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn unauthorized_sets_challenge_header() {
        let response = ApiError::Unauthorized("nope").into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
