use airlane_shared::Coordinate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Free-text city lookup, disambiguated by country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoQuery {
    pub city: String,
    pub country: String,
}

impl GeoQuery {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Result<Self, GeocodeError> {
        let city = city.into().trim().to_string();
        let country = country.into().trim().to_string();
        if city.is_empty() {
            return Err(GeocodeError::InvalidQuery("city name is empty".into()));
        }
        if country.is_empty() {
            return Err(GeocodeError::InvalidQuery("country is empty".into()));
        }
        Ok(Self { city, country })
    }

    /// Single-line form sent to the lookup service.
    pub fn as_text(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// One lookup against the external service. Each call may cost quota.
    async fn geocode(&self, query: &GeoQuery) -> Result<Coordinate, GeocodeError>;
}

/// Cross-process cache of resolved city coordinates.
#[async_trait]
pub trait CoordinateCache: Send + Sync {
    async fn get(&self, city_id: Uuid) -> Result<Option<Coordinate>, Box<dyn std::error::Error + Send + Sync>>;

    async fn put(
        &self,
        city_id: Uuid,
        coordinate: Coordinate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    #[error("No location found for {0:?}")]
    NotFound(String),

    #[error("Geocoding service unavailable: {0}")]
    Unavailable(String),

    #[error("Geocoding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid geocoding query: {0}")]
    InvalidQuery(String),

    #[error("Geocoding service returned an invalid coordinate: {0}")]
    InvalidResponse(String),
}

impl GeocodeError {
    /// Transient failures are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeError::Unavailable(_) | GeocodeError::Timeout(_))
    }
}
