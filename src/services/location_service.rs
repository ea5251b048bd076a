use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    config::Settings,
    error::{ApiError, LocationError},
    models::{Coordinates, LocationSample},
    services::session_cache::{self, SessionCache},
};

/// Device geolocation.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Coordinates to a human-readable address.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> Result<String, ApiError>;
}

/// Resolve an address, substituting the coordinate label on any failure.
/// The flag reports whether the resolver produced the address.
pub async fn resolve_or_fallback(resolver: &dyn AddressResolver, coordinates: Coordinates) -> (String, bool) {
    match resolver.reverse(coordinates).await {
        Ok(address) => (address, true),
        Err(e) => {
            tracing::warn!(
                latitude = coordinates.latitude,
                longitude = coordinates.longitude,
                error = %e,
                "reverse geocoding failed, using coordinates"
            );
            (coordinates.fallback_label(), false)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub timeout: Duration,
    /// A previous fix younger than this is reused instead of asking the device again.
    pub max_age: Duration,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_age: Duration::from_secs(300),
        }
    }
}

impl LocationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.geolocation_timeout(),
            max_age: settings.geolocation_max_age(),
        }
    }
}

pub struct LocationService {
    provider: Arc<dyn PositionProvider>,
    resolver: Arc<dyn AddressResolver>,
    cache: Arc<dyn SessionCache>,
    config: LocationConfig,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl LocationService {
    pub fn new(
        provider: Arc<dyn PositionProvider>,
        resolver: Arc<dyn AddressResolver>,
        cache: Arc<dyn SessionCache>,
        config: LocationConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            cache,
            config,
            last_fix: Mutex::new(None),
        }
    }

    /// Locate the device and resolve its address, remembering it for the completion form.
    pub async fn detect(&self) -> Result<LocationSample, LocationError> {
        let coordinates = self.position().await?;
        let (address, resolved) = resolve_or_fallback(self.resolver.as_ref(), coordinates).await;

        let sample = LocationSample::new(address, Some(coordinates));
        session_cache::save_location(self.cache.as_ref(), &sample);
        tracing::info!(resolved, address = %sample.address, "location detected");
        Ok(sample)
    }

    /// Replace the detected address with one typed by the reporter.
    pub fn set_address(&self, address: &str) -> Option<LocationSample> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        let sample = LocationSample::new(address, None);
        session_cache::save_location(self.cache.as_ref(), &sample);
        Some(sample)
    }

    /// Address remembered for this session, if any.
    pub fn remembered(&self) -> Option<LocationSample> {
        session_cache::load_location(self.cache.as_ref()).map(|address| LocationSample::new(address, None))
    }

    async fn position(&self) -> Result<Coordinates, LocationError> {
        let mut last_fix = self.last_fix.lock().await;
        if let Some((taken_at, coordinates)) = *last_fix {
            if taken_at.elapsed() <= self.config.max_age {
                tracing::debug!("reusing recent position fix");
                return Ok(coordinates);
            }
        }

        let coordinates = tokio::time::timeout(self.config.timeout, self.provider.current_position())
            .await
            .map_err(|_| LocationError::Timeout)??;

        if !coordinates.is_valid() {
            return Err(LocationError::Unavailable(format!(
                "device reported invalid coordinates {}",
                coordinates.fallback_label()
            )));
        }

        *last_fix = Some((Instant::now(), coordinates));
        Ok(coordinates)
    }
}
