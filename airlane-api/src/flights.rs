use airlane_core::ledger::SeatOccupancy;
use airlane_shared::FlightStatus;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OccupancyResponse {
    pub flight_id: Uuid,
    pub capacity: usize,
    pub held: usize,
    pub available: usize,
    pub state: SeatOccupancy,
    pub status: FlightStatus,
    pub bookable: bool,
    pub taken_seats: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/flights/{id}/occupancy", get(occupancy))
}

async fn occupancy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OccupancyResponse>, AppError> {
    let occupancy = state.allocator.occupancy(id).await?;

    Ok(Json(OccupancyResponse {
        flight_id: occupancy.flight_id,
        capacity: occupancy.capacity,
        held: occupancy.held(),
        available: occupancy.available(),
        state: occupancy.state(),
        status: occupancy.status,
        bookable: occupancy.bookable,
        taken_seats: occupancy.taken.iter().map(ToString::to_string).collect(),
    }))
}
