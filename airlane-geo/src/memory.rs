//! In-memory airport/route repositories and an offline geocoder, used for
//! local development and tests.

use airlane_core::airport::{Airport, Route};
use airlane_core::geocoding::{GeoQuery, GeocodeError, Geocoder};
use airlane_core::repository::{AirportRepository, RouteRepository, StoreError};
use airlane_shared::Coordinate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAirportRepository {
    airports: RwLock<HashMap<Uuid, Airport>>,
}

impl InMemoryAirportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, airport: Airport) {
        self.airports.write().await.insert(airport.id, airport);
    }
}

#[async_trait]
impl AirportRepository for InMemoryAirportRepository {
    async fn get_airport(&self, id: Uuid) -> Result<Option<Airport>, StoreError> {
        Ok(self.airports.read().await.get(&id).cloned())
    }

    async fn set_coordinate_if_absent(
        &self,
        id: Uuid,
        coordinate: Coordinate,
    ) -> Result<Coordinate, StoreError> {
        let mut airports = self.airports.write().await;
        let airport = airports
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("airport {}", id)))?;
        Ok(*airport.coordinate.get_or_insert(coordinate))
    }

    async fn list_missing_coordinates(&self) -> Result<Vec<Airport>, StoreError> {
        let mut missing: Vec<Airport> = self
            .airports
            .read()
            .await
            .values()
            .filter(|a| a.coordinate.is_none())
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(missing)
    }
}

#[derive(Default)]
pub struct InMemoryRouteRepository {
    routes: RwLock<HashMap<(Uuid, Uuid), Route>>,
}

impl InMemoryRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }
}

#[async_trait]
impl RouteRepository for InMemoryRouteRepository {
    async fn find_route(
        &self,
        source_airport_id: Uuid,
        destination_airport_id: Uuid,
    ) -> Result<Option<Route>, StoreError> {
        Ok(self
            .routes
            .read()
            .await
            .get(&(source_airport_id, destination_airport_id))
            .cloned())
    }

    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        let mut routes = self.routes.write().await;
        let key = (route.source_airport_id, route.destination_airport_id);
        if routes.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "route {} -> {}",
                route.source_airport_id, route.destination_airport_id
            )));
        }
        routes.insert(key, route.clone());
        Ok(())
    }
}

/// Table-driven geocoder. Counts every call and can be told to fail the
/// next N calls with `Unavailable`, or to answer slowly.
#[derive(Default)]
pub struct StaticGeocoder {
    places: Mutex<HashMap<GeoQuery, Coordinate>>,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    latency: Option<Duration>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, query: &GeoQuery, coordinate: Coordinate) {
        self.places
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.clone(), coordinate);
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of lookups issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, query: &GeoQuery) -> Result<Coordinate, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GeocodeError::Unavailable("scripted outage".into()));
        }

        self.places
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .copied()
            .ok_or_else(|| GeocodeError::NotFound(query.as_text()))
    }
}
