pub mod events;
pub mod geo;
pub mod seat;
pub mod status;
