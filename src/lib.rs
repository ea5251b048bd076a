use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    error::ApiError,
    middleware::IpRateLimiter,
    repositories::{InMemoryReportRepository, ReportRepository},
    services::{
        external::NominatimGeocoder, AddressResolver, EvidenceStorage, LocalEvidenceStorage,
        ReportIntakeService,
    },
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Shared state of the intake API
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub storage: Arc<dyn EvidenceStorage>,
    pub report_intake: Arc<ReportIntakeService>,
    pub geocoder: Arc<dyn AddressResolver>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    /// Wire the production services from settings
    pub fn new(config: Settings) -> Result<Self, ApiError> {
        let storage: Arc<dyn EvidenceStorage> =
            Arc::new(LocalEvidenceStorage::new(&config.upload_storage_path));
        let repository: Arc<dyn ReportRepository + Send + Sync> =
            Arc::new(InMemoryReportRepository::new());
        let geocoder: Arc<dyn AddressResolver> = Arc::new(NominatimGeocoder::from_settings(&config)?);

        Ok(Self::with_services(config, storage, repository, geocoder))
    }

    pub fn with_services(
        config: Settings,
        storage: Arc<dyn EvidenceStorage>,
        repository: Arc<dyn ReportRepository + Send + Sync>,
        geocoder: Arc<dyn AddressResolver>,
    ) -> Self {
        let report_intake = Arc::new(ReportIntakeService::new(
            repository,
            config.report_code_max_attempts,
        ));
        let rate_limiter = Arc::new(IpRateLimiter::from_settings(&config));

        tracing::info!(
            storage_path = %config.upload_storage_path,
            api_keys = config.api_keys.len(),
            rate_limit_enabled = config.rate_limit_enabled,
            "application state initialised"
        );

        Self {
            config: Arc::new(config),
            storage,
            report_intake,
            geocoder,
            rate_limiter,
        }
    }
}

/// Build the intake API router with all middleware applied
pub fn create_router(app_state: AppState) -> Router {
    let settings = app_state.config.clone();

    // Public routes (health, reads, geocoding)
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/health/simple", get(handlers::health_check_simple))
        .route("/api/health/ready", get(handlers::readiness_check))
        .route("/api/health/live", get(handlers::liveness_check))
        .route("/api/uploads/*file", get(handlers::serve_upload))
        .route("/api/reports/:code", get(handlers::get_report))
        .route("/api/geocode/reverse", get(handlers::reverse_geocode));

    // Protected routes (API key when configured)
    let mut protected_routes = Router::new()
        .route("/api/uploads", post(handlers::upload_evidence))
        .route("/api/reports", post(handlers::create_report))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::auth::auth_middleware,
        ));

    if settings.rate_limit_enabled {
        protected_routes = protected_routes.route_layer(from_fn_with_state(
            app_state.rate_limiter.clone(),
            middleware::ip_rate_limit_middleware,
        ));
    }

    let body_limit = settings
        .max_image_bytes
        .max(settings.max_video_bytes)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let protected_routes = protected_routes.layer(DefaultBodyLimit::max(
        usize::try_from(body_limit).unwrap_or(usize::MAX),
    ));

    let cors_layer =
        middleware::create_cors_layer(settings.cors_allow_origins.clone(), &settings.api_key_header);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
        .layer(from_fn_with_state(
            Arc::new(middleware::CapturePolicy::from_settings(&settings)),
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_logging_middleware))
        .layer(middleware::create_logging_layer())
        .layer(cors_layer)
}
