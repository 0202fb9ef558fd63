use airlane_shared::Coordinate;
use async_trait::async_trait;
use uuid::Uuid;

use crate::airport::{Airport, Route};

/// Repository trait for airport data access
#[async_trait]
pub trait AirportRepository: Send + Sync {
    async fn get_airport(&self, id: Uuid) -> Result<Option<Airport>, StoreError>;

    /// Store `coordinate` on the airport unless one is already present.
    /// Returns the coordinate the airport ends up with (first writer wins).
    async fn set_coordinate_if_absent(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> Result<Coordinate, StoreError>;

    async fn list_missing_coordinates(&self) -> Result<Vec<Airport>, StoreError>;
}

/// Repository trait for route data access
#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn find_route(
        &self,
        source_airport_id: Uuid,
        destination_airport_id: Uuid,
    ) -> Result<Option<Route>, StoreError>;

    /// Insert a new route. Fails with [`StoreError::Conflict`] when the
    /// (source, destination) pair already exists; an existing distance is
    /// never overwritten.
    async fn insert_route(&self, route: &Route) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Seat holds lapsed before commit for reservation {0}")]
    ReservationLapsed(Uuid),

    #[error("Database error: {0}")]
    Database(String),
}
