use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Numeric address used whenever reverse geocoding fails.
    pub fn fallback_label(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Where the report happened. One per reporting session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub address: String,
    pub detected_at: DateTime<Utc>,
    pub coordinates: Option<Coordinates>,
}

impl LocationSample {
    pub fn new(address: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        Self {
            address: address.into(),
            detected_at: Utc::now(),
            coordinates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_label() {
        let coords = Coordinates::new(-6.2, 106.816666);
        assert_eq!(coords.fallback_label(), "-6.200000, 106.816666");
    }

    #[test]
    fn test_validity() {
        assert!(Coordinates::new(51.5, -0.12).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, 181.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }
}
