use airlane_shared::Coordinate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The city an airport serves; geocoding is keyed by its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRef {
    pub id: Uuid,
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub id: Uuid,
    pub name: String,
    pub iata_code: Option<String>,
    pub city: CityRef,
    /// Set once, the first time the airport's city is geocoded.
    pub coordinate: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub source_airport_id: Uuid,
    pub destination_airport_id: Uuid,
    /// Great-circle distance in whole kilometres, fixed at creation.
    pub distance_km: u32,
    pub created_at: DateTime<Utc>,
}

impl Route {
    pub fn new(source_airport_id: Uuid, destination_airport_id: Uuid, distance_km: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_airport_id,
            destination_airport_id,
            distance_km,
            created_at: Utc::now(),
        }
    }
}
