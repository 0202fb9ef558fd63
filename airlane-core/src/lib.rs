pub mod airport;
pub mod events;
pub mod geocoding;
pub mod ledger;
pub mod repository;

pub use airport::{Airport, CityRef, Route};
pub use events::{EventPublisher, publish_json};
pub use geocoding::{CoordinateCache, GeoQuery, GeocodeError, Geocoder};
pub use ledger::{CapacityLedger, LedgerError, Occupancy, Reservation, SeatOccupancy};
pub use repository::{AirportRepository, RouteRepository, StoreError};
