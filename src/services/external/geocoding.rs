use async_trait::async_trait;
use governor::{
    clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter,
};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Settings,
    error::ApiError,
    models::Coordinates,
    services::location_service::AddressResolver,
};

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    display_name: Option<String>,
    error: Option<String>,
}

/// Reverse geocoding against a Nominatim-compatible provider.
///
/// The public instance allows one request per second per client, so requests are
/// paced with a direct rate limiter before they leave the process.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl NominatimGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, ApiError> {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).ok_or_else(|| {
            ApiError::Validation("requests_per_second must be greater than 0".to_string())
        })?);

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Self::new(
            settings.geocoding_url.clone(),
            &settings.geocoding_user_agent,
            settings.http_timeout(),
            1,
        )
    }
}

#[async_trait]
impl AddressResolver for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<String, ApiError> {
        self.rate_limiter.until_ready().await;

        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("format", "jsonv2"), ("lat", lat.as_str()), ("lon", lon.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::ExternalService(format!(
                "Geocoding provider returned HTTP {}",
                status
            )));
        }

        let body: NominatimResponse = response.json().await.map_err(|e| {
            ApiError::ExternalService(format!("Failed to parse geocoding response: {}", e))
        })?;

        if let Some(error) = body.error {
            return Err(ApiError::ExternalService(format!("Geocoding failed: {}", error)));
        }

        body.display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::ExternalService("Geocoding returned no address".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    address: String,
    resolved: bool,
}

/// Resolves addresses through the intake API's reverse-geocoding route, so capture
/// clients never talk to the provider directly.
pub struct GeocodeApiClient {
    client: Client,
    endpoint: String,
}

impl GeocodeApiClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Self::new(settings.geocode_endpoint(), settings.http_timeout())
    }
}

#[async_trait]
impl AddressResolver for GeocodeApiClient {
    async fn reverse(&self, coordinates: Coordinates) -> Result<String, ApiError> {
        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::ExternalService(format!(
                "Reverse geocoding returned HTTP {}",
                response.status()
            )));
        }

        let body: ReverseGeocodeResponse = response.json().await.map_err(|e| {
            ApiError::ExternalService(format!("Failed to parse reverse geocoding response: {}", e))
        })?;

        // The intake API already substitutes coordinates when its provider fails.
        if !body.resolved {
            return Err(ApiError::ExternalService("Address could not be resolved".to_string()));
        }
        Ok(body.address)
    }
}
