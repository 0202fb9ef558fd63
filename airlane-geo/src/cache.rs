use airlane_core::airport::CityRef;
use airlane_core::geocoding::{CoordinateCache, GeoQuery, GeocodeError};
use airlane_shared::Coordinate;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::geocoder::GeocoderClient;

type Lookup = Shared<BoxFuture<'static, Result<Coordinate, GeocodeError>>>;

#[derive(Default)]
struct CacheState {
    resolved: HashMap<Uuid, Coordinate>,
    /// Outstanding lookups, tagged with a generation so a late waiter never
    /// removes a newer lookup for the same city.
    in_flight: HashMap<Uuid, (u64, Lookup)>,
    next_generation: u64,
}

/// City coordinate cache with single-flight lookups.
///
/// Concurrent callers for the same city await one outstanding geocoder call
/// and all receive its result. Successes are kept for the life of the
/// process; failures are not cached, so a later call tries again.
pub struct CityCoordinateCache {
    client: GeocoderClient,
    shared: Option<Arc<dyn CoordinateCache>>,
    state: Mutex<CacheState>,
}

impl CityCoordinateCache {
    pub fn new(client: GeocoderClient) -> Self {
        Self {
            client,
            shared: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Consult (and fill) a cross-process cache before calling the geocoder.
    pub fn with_shared_cache(mut self, shared: Arc<dyn CoordinateCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Seed a known coordinate, e.g. one already stored on an airport.
    pub async fn remember(&self, city_id: Uuid, coordinate: Coordinate) {
        self.state.lock().await.resolved.entry(city_id).or_insert(coordinate);
    }

    pub async fn cached(&self, city_id: Uuid) -> Option<Coordinate> {
        self.state.lock().await.resolved.get(&city_id).copied()
    }

    pub async fn resolve(&self, city: &CityRef) -> Result<Coordinate, GeocodeError> {
        let (generation, lookup) = {
            let mut state = self.state.lock().await;
            if let Some(coordinate) = state.resolved.get(&city.id) {
                return Ok(*coordinate);
            }

            match state.in_flight.get(&city.id) {
                Some((generation, lookup)) => {
                    debug!("Joining in-flight geocode for city {}", city.id);
                    (*generation, lookup.clone())
                }
                None => {
                    let query = GeoQuery::new(&city.name, &city.country)?;
                    let lookup = Self::lookup(self.client.clone(), self.shared.clone(), city.id, query)
                        .boxed()
                        .shared();
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    state.in_flight.insert(city.id, (generation, lookup.clone()));
                    (generation, lookup)
                }
            }
        };

        let result = lookup.await;

        let mut state = self.state.lock().await;
        if let Ok(coordinate) = &result {
            state.resolved.entry(city.id).or_insert(*coordinate);
        }
        if matches!(state.in_flight.get(&city.id), Some((g, _)) if *g == generation) {
            state.in_flight.remove(&city.id);
        }
        result
    }

    async fn lookup(
        client: GeocoderClient,
        shared: Option<Arc<dyn CoordinateCache>>,
        city_id: Uuid,
        query: GeoQuery,
    ) -> Result<Coordinate, GeocodeError> {
        if let Some(cache) = &shared {
            match cache.get(city_id).await {
                Ok(Some(coordinate)) => {
                    debug!("Shared cache hit for city {}", city_id);
                    return Ok(coordinate);
                }
                Ok(None) => {}
                Err(e) => warn!("Shared coordinate cache read failed for city {}: {}", city_id, e),
            }
        }

        let coordinate = client.resolve(&query).await?;
        info!(
            "Geocoded {:?} -> ({}, {})",
            query.as_text(),
            coordinate.latitude(),
            coordinate.longitude()
        );

        if let Some(cache) = &shared {
            if let Err(e) = cache.put(city_id, coordinate).await {
                warn!("Shared coordinate cache write failed for city {}: {}", city_id, e);
            }
        }

        Ok(coordinate)
    }
}
