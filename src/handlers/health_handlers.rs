use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::{error::ApiError, AppState};

/// Health check including the upload storage directory
pub async fn health_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let storage_status = check_storage_health(&app_state).await;
    let healthy = storage_status["healthy"].as_bool().unwrap_or(false);

    if !healthy {
        return Err(ApiError::internal("Service is unhealthy"));
    }

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "violation-reporter",
        "checks": {
            "storage": storage_status
        }
    })))
}

/// Simple health check endpoint for load balancers
pub async fn health_check_simple() -> Result<&'static str, StatusCode> {
    Ok("OK")
}

async fn check_storage_health(app_state: &AppState) -> Value {
    match app_state.storage.health_check().await {
        Ok(()) => json!({
            "healthy": true,
            "message": "Upload storage is writable"
        }),
        Err(e) => {
            tracing::error!("Storage health check failed: {}", e);
            json!({
                "healthy": false,
                "message": "Upload storage is not available",
                "error": e.to_string()
            })
        }
    }
}

/// Readiness check endpoint for Kubernetes
pub async fn readiness_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let storage_ready = check_storage_health(&app_state).await;
    let ready = storage_ready["healthy"].as_bool().unwrap_or(false);

    if !ready {
        return Err(ApiError::internal("Service is not ready"));
    }

    Ok(Json(json!({
        "ready": ready,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "storage": storage_ready
        }
    })))
}

/// Liveness check endpoint for Kubernetes
pub async fn liveness_check() -> Json<Value> {
    Json(json!({
        "alive": true,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
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

    #[tokio::test]
    async fn test_health_check_simple() {
        let app = Router::new().route("/health", get(health_check_simple));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_liveness_check() {
        let app = Router::new().route("/liveness", get(liveness_check));

        let request = Request::builder().uri("/liveness").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
