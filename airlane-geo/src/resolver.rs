use airlane_core::airport::{Airport, Route};
use airlane_core::events::{publish_json, EventPublisher};
use airlane_core::geocoding::GeocodeError;
use airlane_core::repository::{AirportRepository, RouteRepository, StoreError};
use airlane_shared::events::{RouteCreatedEvent, ROUTES_CREATED_TOPIC};
use airlane_shared::Coordinate;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CityCoordinateCache;
use crate::distance::route_distance_km;

/// Creates routes and fixes their distance from the airports' coordinates,
/// geocoding an airport's city the first time it is needed.
pub struct RouteResolver {
    airports: Arc<dyn AirportRepository>,
    routes: Arc<dyn RouteRepository>,
    coordinates: Arc<CityCoordinateCache>,
    events: Option<Arc<dyn EventPublisher>>,
}

/// Outcome of a coordinate backfill run
#[derive(Debug, Default, Clone, Serialize)]
pub struct BackfillReport {
    pub resolved: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
    pub failed: Vec<BackfillFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillFailure {
    pub airport_id: Uuid,
    pub error: String,
}

impl RouteResolver {
    pub fn new(
        airports: Arc<dyn AirportRepository>,
        routes: Arc<dyn RouteRepository>,
        coordinates: Arc<CityCoordinateCache>,
    ) -> Self {
        Self {
            airports,
            routes,
            coordinates,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn create_route(
        &self,
        source_airport_id: Uuid,
        destination_airport_id: Uuid,
    ) -> Result<Route, RouteError> {
        if source_airport_id == destination_airport_id {
            return Err(RouteError::SameAirport(source_airport_id));
        }

        // Checked before geocoding so a duplicate request costs no lookups
        if self
            .routes
            .find_route(source_airport_id, destination_airport_id)
            .await?
            .is_some()
        {
            return Err(RouteError::AlreadyExists {
                origin: source_airport_id,
                destination: destination_airport_id,
            });
        }

        let source = self.load_airport(source_airport_id).await?;
        let destination = self.load_airport(destination_airport_id).await?;

        let (from, to) = tokio::try_join!(
            self.airport_coordinate(&source),
            self.airport_coordinate(&destination)
        )?;

        let route = Route::new(source.id, destination.id, route_distance_km(from, to));

        match self.routes.insert_route(&route).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(RouteError::AlreadyExists {
                    origin: source.id,
                    destination: destination.id,
                })
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Route {} created: {} -> {} ({} km)",
            route.id, source.name, destination.name, route.distance_km
        );

        let event = RouteCreatedEvent {
            route_id: route.id,
            source_airport_id: route.source_airport_id,
            destination_airport_id: route.destination_airport_id,
            distance_km: route.distance_km,
            timestamp: Utc::now().timestamp(),
        };
        publish_json(self.events.as_deref(), ROUTES_CREATED_TOPIC, &route.id.to_string(), &event).await;

        Ok(route)
    }

    /// Geocode every airport that still lacks a coordinate. Individual
    /// failures are recorded and do not stop the run.
    pub async fn backfill_missing_coordinates(&self) -> Result<BackfillReport, RouteError> {
        let airports = self.airports.list_missing_coordinates().await?;
        info!("Backfilling coordinates for {} airport(s)", airports.len());

        let mut report = BackfillReport::default();
        for airport in airports {
            match self.airport_coordinate(&airport).await {
                Ok(_) => report.resolved.push(airport.id),
                Err(RouteError::Geocode(GeocodeError::NotFound(query))) => {
                    warn!("No coordinates found for airport {} ({})", airport.name, query);
                    report.not_found.push(airport.id);
                }
                Err(e) => {
                    warn!("Could not geocode airport {}: {}", airport.name, e);
                    report.failed.push(BackfillFailure {
                        airport_id: airport.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn load_airport(&self, id: Uuid) -> Result<Airport, RouteError> {
        self.airports
            .get_airport(id)
            .await?
            .ok_or(RouteError::AirportNotFound(id))
    }

    /// The airport's coordinate, resolving and storing it on first use.
    async fn airport_coordinate(&self, airport: &Airport) -> Result<Coordinate, RouteError> {
        if let Some(coordinate) = airport.coordinate {
            self.coordinates.remember(airport.city.id, coordinate).await;
            return Ok(coordinate);
        }

        let coordinate = self.coordinates.resolve(&airport.city).await?;
        let stored = self
            .airports
            .set_coordinate_if_absent(airport.id, coordinate)
            .await?;
        Ok(stored)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Source and destination must differ (airport {0})")]
    SameAirport(Uuid),

    #[error("Airport not found: {0}")]
    AirportNotFound(Uuid),

    #[error("Route {origin} -> {destination} already exists")]
    AlreadyExists { origin: Uuid, destination: Uuid },

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error("Route storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for RouteError {
    fn from(err: StoreError) -> Self {
        RouteError::Storage(err.to_string())
    }
}
