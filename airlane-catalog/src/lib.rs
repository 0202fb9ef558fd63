pub mod aircraft;
pub mod flight;
pub mod inventory;

pub use aircraft::{Aircraft, AircraftError};
pub use flight::{Flight, FlightError};
pub use inventory::InMemoryCapacityLedger;
