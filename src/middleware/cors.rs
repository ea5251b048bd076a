use axum::http::{HeaderName, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Create CORS layer with configurable origins from settings
pub fn create_cors_layer(allowed_origins: Vec<String>, api_key_header: &str) -> CorsLayer {
    let mut allowed_headers = vec![
        HeaderName::from_static("content-type"),
        HeaderName::from_static("x-requested-with"),
        HeaderName::from_static("x-request-id"),
    ];
    match HeaderName::try_from(api_key_header.to_ascii_lowercase()) {
        Ok(name) => allowed_headers.push(name),
        Err(e) => tracing::warn!("CORS: Invalid API key header '{}': {}", api_key_header, e),
    }

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        // Development mode: mirror the request origin so the header is always set
        tracing::debug!("CORS: Allowing all origins (development mode)");
        return CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(METHODS)
            .allow_headers(allowed_headers);
    }

    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(parsed) => {
                tracing::debug!("CORS: Allowing origin: {}", origin);
                Some(parsed)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, falling back to permissive mode");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(METHODS)
            .allow_headers(allowed_headers)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(METHODS)
            .allow_headers(allowed_headers)
    }
}
