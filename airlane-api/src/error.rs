use airlane_core::geocoding::GeocodeError;
use airlane_core::ledger::LedgerError;
use airlane_geo::RouteError;
use airlane_order::AllocationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnprocessableEntity(String),
    ServiceUnavailable(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        let msg = err.to_string();
        match err {
            AllocationError::Validation(_) => AppError::ValidationError(msg),
            AllocationError::Rejected { reason: LedgerError::SeatOutOfRange(_), .. } => {
                AppError::UnprocessableEntity(msg)
            }
            AllocationError::Rejected { .. } | AllocationError::AlreadyCancelled(_) => {
                AppError::ConflictError(msg)
            }
            AllocationError::Unavailable { .. } => AppError::ServiceUnavailable(msg),
            AllocationError::NotFound(_) => AppError::NotFoundError(msg),
            AllocationError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<RouteError> for AppError {
    fn from(err: RouteError) -> Self {
        let msg = err.to_string();
        match err {
            RouteError::SameAirport(_) => AppError::ValidationError(msg),
            RouteError::AirportNotFound(_) => AppError::NotFoundError(msg),
            RouteError::AlreadyExists { .. } => AppError::ConflictError(msg),
            RouteError::Geocode(GeocodeError::NotFound(_) | GeocodeError::InvalidQuery(_)) => {
                AppError::UnprocessableEntity(msg)
            }
            RouteError::Geocode(_) => AppError::ServiceUnavailable(msg),
            RouteError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlane_shared::SeatKey;
    use uuid::Uuid;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_allocation_error_statuses() {
        let flight_id = Uuid::new_v4();
        let seat = SeatKey { row: 1, seat: 1 };

        assert_eq!(status_of(AllocationError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AllocationError::Rejected { flight_id, reason: LedgerError::SeatTaken(seat) }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AllocationError::Rejected { flight_id, reason: LedgerError::SeatOutOfRange(seat) }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AllocationError::Unavailable { flight_id }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AllocationError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_route_error_statuses() {
        assert_eq!(
            status_of(RouteError::Geocode(GeocodeError::NotFound("Atlantis".into()))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(RouteError::Geocode(GeocodeError::Unavailable("503".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(RouteError::SameAirport(Uuid::nil())), StatusCode::BAD_REQUEST);
    }
}
