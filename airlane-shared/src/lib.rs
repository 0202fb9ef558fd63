pub mod models;

pub use models::events;
pub use models::geo::{Coordinate, CoordinateError};
pub use models::seat::{CabinLayout, SeatDesignator, SeatKey, SeatParseError};
pub use models::status::FlightStatus;
