use airlane_core::geocoding::{GeoQuery, GeocodeError, Geocoder};
use airlane_shared::Coordinate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry::{retry_with_predicate, RetryPolicy};

/// Geocoder Client: wraps a raw [`Geocoder`] with a per-attempt timeout and
/// bounded exponential-backoff retries.
///
/// `NotFound` is returned at once. `Unavailable` and per-attempt timeouts are
/// retried up to `policy.max_attempts`; once exhausted, a timeout surfaces as
/// `Unavailable` as well. Successful coordinates are rounded to four places.
#[derive(Clone)]
pub struct GeocoderClient {
    inner: Arc<dyn Geocoder>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl GeocoderClient {
    pub fn new(inner: Arc<dyn Geocoder>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self { inner, timeout, policy }
    }

    pub async fn resolve(&self, query: &GeoQuery) -> Result<Coordinate, GeocodeError> {
        debug!("Geocoding {:?}", query.as_text());

        let result = retry_with_predicate(
            &self.policy,
            move || async move {
                match tokio::time::timeout(self.timeout, self.inner.geocode(query)).await {
                    Ok(result) => result,
                    Err(_) => Err(GeocodeError::Timeout(self.timeout)),
                }
            },
            GeocodeError::is_transient,
        )
        .await;

        match result {
            Ok(coordinate) => Ok(coordinate.rounded()),
            Err(GeocodeError::Timeout(after)) => {
                warn!("Geocoding {:?} kept timing out", query.as_text());
                Err(GeocodeError::Unavailable(format!("timed out after {:?}", after)))
            }
            Err(e) => Err(e),
        }
    }
}
