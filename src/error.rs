use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::models::EvidenceKind;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Conflict error: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new external service error
    pub fn external_service<T: Into<String>>(msg: T) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Create a new authentication error
    pub fn authentication<T: Into<String>>(msg: T) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a new rate limit error
    pub fn rate_limit<T: Into<String>>(msg: T) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();

        let (status, error_message, error_code) = match self {
            ApiError::ExternalService(ref msg) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %msg,
                    "external service error occurred"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    msg.as_str(),
                    "EXTERNAL_SERVICE_ERROR",
                )
            }
            ApiError::Validation(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "validation error occurred"
                );
                (StatusCode::BAD_REQUEST, msg.as_str(), "VALIDATION_ERROR")
            }
            ApiError::NotFound(ref msg) => {
                tracing::info!(
                    error_id = %error_id,
                    error = %msg,
                    "resource not found"
                );
                (StatusCode::NOT_FOUND, msg.as_str(), "NOT_FOUND")
            }
            ApiError::Io(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "IO error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage backend unavailable",
                    "STORAGE_ERROR",
                )
            }
            ApiError::HttpClient(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "HTTP client error occurred"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    "External service unavailable",
                    "HTTP_CLIENT_ERROR",
                )
            }
            ApiError::Authentication(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "authentication error occurred"
                );
                (
                    StatusCode::UNAUTHORIZED,
                    msg.as_str(),
                    "AUTHENTICATION_ERROR",
                )
            }
            ApiError::RateLimit(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "rate limit exceeded"
                );
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    msg.as_str(),
                    "RATE_LIMIT_EXCEEDED",
                )
            }
            ApiError::Conflict(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "conflict error occurred"
                );
                (StatusCode::CONFLICT, msg.as_str(), "CONFLICT_ERROR")
            }
            ApiError::Internal(ref msg) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %msg,
                    "internal server error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    msg.as_str(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": error_code,
                "error_id": error_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

/// Camera and microphone failures. Fatal to one capture attempt, never to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("permission to use the camera or microphone was denied")]
    PermissionDenied,

    #[error("no camera or microphone device was found")]
    DeviceNotFound,

    #[error("media stream has already been released")]
    StreamReleased,

    #[error("no video frame has been rendered yet")]
    NoFrame,

    #[error("failed to encode capture: {0}")]
    Encoding(String),

    #[error("media device error: {0}")]
    Unknown(String),
}

impl DeviceError {
    /// Guidance shown in the dismissible notification; differs per cause.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Camera access was blocked. Allow camera and microphone access in your browser settings and try again."
            }
            DeviceError::DeviceNotFound => {
                "No camera was found on this device. Connect a camera or switch devices to capture evidence."
            }
            DeviceError::StreamReleased | DeviceError::NoFrame => {
                "The camera is not ready yet. Wait for the preview to appear and try again."
            }
            DeviceError::Encoding(_) | DeviceError::Unknown(_) => {
                "Something went wrong with the camera. Please try again."
            }
        }
    }
}

/// Failures of id-keyed Evidence Store mutations. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("evidence item {0} is not in the session")]
    UnknownItem(Uuid),

    #[error("evidence item {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },
}

/// Item-scoped upload failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not authenticated")]
    Unauthorized,

    #[error("storage backend unavailable: {0}")]
    Storage(String),

    #[error("invalid upload response: {0}")]
    InvalidResponse(String),

    #[error("{kind:?} of {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        kind: EvidenceKind,
        size: usize,
        limit: u64,
    },

    #[error("evidence item {0} is not in the session")]
    UnknownItem(Uuid),

    #[error("evidence item {0} is already uploading")]
    AlreadyInProgress(Uuid),
}

impl UploadError {
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Network(_) => {
                "Upload failed because of a network problem. Check your connection and retry.".to_string()
            }
            UploadError::Rejected { message, .. } => format!("The file was rejected: {}", message),
            UploadError::Unauthorized => "Please sign in again to upload evidence.".to_string(),
            UploadError::Storage(_) => {
                "The storage service is unavailable right now. Please retry shortly.".to_string()
            }
            UploadError::TooLarge { .. } => "This file is too large to upload.".to_string(),
            other => format!("Upload failed: {}", other),
        }
    }
}

/// Session-level submission failures. The Evidence Store is preserved on all of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("report is not ready: {0}")]
    NotReady(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("server error: {0}")]
    Server(String),
}

impl SubmissionError {
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::NotReady(reason) => format!("Not ready to submit: {}", reason),
            SubmissionError::Validation(reason) => reason.clone(),
            SubmissionError::Server(reason) => {
                format!("Submission failed: {}. Your evidence is kept, please retry.", reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a location fix")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn test_error_handler() -> Result<&'static str, ApiError> {
        Err(ApiError::validation("Test validation error"))
    }

    async fn test_unauthenticated_handler() -> Result<&'static str, ApiError> {
        Err(ApiError::authentication("Missing API key"))
    }

    async fn test_storage_error_handler() -> Result<&'static str, ApiError> {
        Err(ApiError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk gone",
        )))
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let app = Router::new().route("/test", get(test_error_handler));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authentication_error_response() {
        let app = Router::new().route("/test", get(test_unauthenticated_handler));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_storage_error_response() {
        let app = Router::new().route("/test", get(test_storage_error_handler));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(ApiError::validation("test"), ApiError::Validation(_)));
        assert!(matches!(ApiError::not_found("test"), ApiError::NotFound(_)));
        assert!(matches!(ApiError::internal("test"), ApiError::Internal(_)));
        assert!(matches!(
            ApiError::external_service("test"),
            ApiError::ExternalService(_)
        ));
        assert!(matches!(
            ApiError::authentication("test"),
            ApiError::Authentication(_)
        ));
        assert!(matches!(ApiError::rate_limit("test"), ApiError::RateLimit(_)));
        assert!(matches!(ApiError::conflict("test"), ApiError::Conflict(_)));
    }

    #[test]
    fn test_device_errors_have_distinct_guidance() {
        assert_ne!(
            DeviceError::PermissionDenied.user_message(),
            DeviceError::DeviceNotFound.user_message()
        );
    }
}
