use airlane_shared::FlightStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled operation of one aircraft on one route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub route_id: Uuid,
    pub aircraft_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub status: FlightStatus,
}

impl Flight {
    pub fn new(
        flight_number: impl Into<String>,
        route_id: Uuid,
        aircraft_id: Uuid,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) -> Result<Self, FlightError> {
        if departure_time >= arrival_time {
            return Err(FlightError::InvalidSchedule {
                departure: departure_time,
                arrival: arrival_time,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            flight_number: flight_number.into(),
            route_id,
            aircraft_id,
            departure_time,
            arrival_time,
            status: FlightStatus::Scheduled,
        })
    }

    /// Block time in hours, rounded to two decimals
    pub fn flight_time_hours(&self) -> f64 {
        let seconds = (self.arrival_time - self.departure_time).num_seconds() as f64;
        (seconds / 3600.0 * 100.0).round() / 100.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlightError {
    #[error("Departure {departure} must be before arrival {arrival}")]
    InvalidSchedule {
        departure: DateTime<Utc>,
        arrival: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_schedule_validation() {
        let departure = Utc::now();
        let flight = Flight::new("PS101", Uuid::new_v4(), Uuid::new_v4(), departure, departure + Duration::minutes(85)).unwrap();
        assert_eq!(flight.flight_time_hours(), 1.42);
        assert_eq!(flight.status, FlightStatus::Scheduled);

        let result = Flight::new("PS102", Uuid::new_v4(), Uuid::new_v4(), departure, departure);
        assert!(matches!(result, Err(FlightError::InvalidSchedule { .. })));
    }
}
