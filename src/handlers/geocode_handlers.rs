use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError, services::location_service::resolve_or_fallback,
    utils::validate_coordinates, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ReverseGeocodeQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
pub struct ReverseGeocodeResponse {
    pub address: String,
    pub resolved: bool,
}

/// Reverse-geocode a coordinate pair. Provider failures fall back to the
/// formatted coordinates with `resolved: false`.
pub async fn reverse_geocode(
    State(app_state): State<AppState>,
    query: Result<Query<ReverseGeocodeQuery>, QueryRejection>,
) -> Result<Json<ReverseGeocodeResponse>, ApiError> {
    let Query(query) = query
        .map_err(|e| ApiError::Validation(format!("Invalid coordinates: {}", e.body_text())))?;
    let coordinates = validate_coordinates(query.lat, query.lon)?;

    let (address, resolved) = resolve_or_fallback(app_state.geocoder.as_ref(), coordinates).await;
    Ok(Json(ReverseGeocodeResponse { address, resolved }))
}
