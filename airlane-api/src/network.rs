use airlane_core::airport::Route;
use airlane_geo::BackfillReport;
use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub source_airport_id: Uuid,
    pub destination_airport_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/routes", post(create_route))
        .route("/v1/admin/geocode/backfill", post(backfill_coordinates))
}

async fn create_route(
    State(state): State<AppState>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<Route>), AppError> {
    let route = state
        .routes
        .create_route(req.source_airport_id, req.destination_airport_id)
        .await?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn backfill_coordinates(State(state): State<AppState>) -> Result<Json<BackfillReport>, AppError> {
    Ok(Json(state.routes.backfill_missing_coordinates().await?))
}
