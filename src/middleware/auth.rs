use crate::{error::ApiError, AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// API-key authentication for intake routes.
///
/// With no keys configured the API runs open (development mode).
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let settings = &state.config;

    if settings.api_keys.is_empty() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(settings.api_key_header.as_str())
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if settings.api_keys.iter().any(|allowed| allowed == key) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            tracing::debug!(uri = %request.uri(), "invalid API key");
            Err(ApiError::authentication("Invalid API key"))
        }
        None => {
            tracing::debug!(uri = %request.uri(), "missing API key");
            Err(ApiError::authentication("Missing API key"))
        }
    }
}
