use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::Settings;

/// Browser features the capture pages use.
const CAPTURE_FEATURES: [&str; 3] = ["camera", "microphone", "geolocation"];

/// Response headers for the capture and completion pages, rendered once from settings.
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    headers: HeaderMap,
}

impl CapturePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.capture_permission_origins,
            &settings.evidence_media_origins,
        )
    }

    /// `permission_origins` may use the camera, microphone and location besides our
    /// own origin; `media_origins` may serve evidence previews.
    pub fn new(permission_origins: &[String], media_origins: &[String]) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );

        insert_rendered(
            &mut headers,
            header::CONTENT_SECURITY_POLICY,
            content_security_policy(media_origins),
        );
        insert_rendered(
            &mut headers,
            header::HeaderName::from_static("permissions-policy"),
            permissions_policy(permission_origins),
        );

        Self { headers }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn insert_rendered(headers: &mut HeaderMap, name: header::HeaderName, value: String) {
    match HeaderValue::try_from(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "skipping unrenderable security header"),
    }
}

/// Previews of just-captured evidence are `blob:` URLs; uploaded evidence may be
/// served from the configured media origins.
fn content_security_policy(media_origins: &[String]) -> String {
    let extra: String = media_origins
        .iter()
        .map(|origin| format!(" {}", origin))
        .collect();
    format!(
        "default-src 'self'; img-src 'self' blob: data:{extra}; media-src 'self' blob:{extra}; \
         connect-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'"
    )
}

fn permissions_policy(permission_origins: &[String]) -> String {
    let allow: String = std::iter::once("self".to_string())
        .chain(permission_origins.iter().map(|origin| format!("\"{}\"", origin)))
        .collect::<Vec<_>>()
        .join(" ");
    CAPTURE_FEATURES
        .iter()
        .map(|feature| format!("{}=({})", feature, allow))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn security_headers_middleware(
    State(policy): State<Arc<CapturePolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in policy.headers() {
        // Handlers that set their own value (e.g. served uploads) keep it.
        if !headers.contains_key(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    response
}
