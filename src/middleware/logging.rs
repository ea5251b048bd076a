use anyhow::Context;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const SLOW_REQUEST: Duration = Duration::from_millis(1000);

/// Create the tower-http trace layer used for per-request spans
pub fn create_logging_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG))
}

/// Request/response logging with a correlation id, echoed back as `x-request-id`
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = Instant::now();

    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let remote_addr = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
        })
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        user_agent = %user_agent,
        remote_addr = %remote_addr,
        "incoming request"
    );

    let mut response = next.run(request).await;

    let duration = start_time.elapsed();
    let status = response.status();

    if duration > SLOW_REQUEST {
        tracing::warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "slow request"
        );
    } else {
        tracing::debug!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "request completed"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}

fn parse_level(log_level: &str) -> Option<Level> {
    match log_level.to_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize structured logging from settings
pub fn init_logging(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    let level = parse_level(log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', defaulting to INFO", log_level);
        Level::INFO
    });

    // LOG_LEVEL from config always takes precedence over RUST_LOG
    let filter_string = format!("violation_reporter={},tower_http=info", level);
    let env_filter = tracing_subscriber::EnvFilter::new(filter_string);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match log_format.to_lowercase().as_str() {
        "plain" | "text" => {
            let plain_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true);

            subscriber
                .with(plain_layer)
                .try_init()
                .context("failed to install plain log subscriber")?;
        }
        other => {
            if other != "json" {
                eprintln!("Invalid log format '{}', defaulting to JSON", log_format);
            }
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true);

            subscriber
                .with(json_layer)
                .try_init()
                .context("failed to install json log subscriber")?;
        }
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        "logging initialized"
    );

    Ok(())
}
