pub mod cache;
pub mod distance;
pub mod geocoder;
pub mod memory;
pub mod nominatim;
pub mod resolver;
pub mod retry;

pub use cache::CityCoordinateCache;
pub use distance::{distance_km, route_distance_km, EARTH_RADIUS_KM};
pub use geocoder::GeocoderClient;
pub use memory::{InMemoryAirportRepository, InMemoryRouteRepository, StaticGeocoder};
pub use nominatim::NominatimGeocoder;
pub use resolver::{BackfillReport, RouteError, RouteResolver};
pub use retry::RetryPolicy;
