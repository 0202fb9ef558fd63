use airlane_shared::{CabinLayout, FlightStatus, SeatKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Per-flight seat authority.
///
/// Implementations serialize `try_reserve` and `release` for the same flight
/// and let different flights proceed in parallel. A reservation is
/// all-or-nothing: either every requested seat is held under the returned
/// token or none is.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    async fn try_reserve(
        &self,
        flight_id: Uuid,
        seats: &BTreeSet<SeatKey>,
    ) -> Result<Reservation, LedgerError>;

    /// Free the seats of `reservation` that are still held under its id.
    /// Releasing seats that are no longer held is a no-op.
    async fn release(&self, reservation: &Reservation) -> Result<(), LedgerError>;

    async fn occupancy(&self, flight_id: Uuid) -> Result<Occupancy, LedgerError>;
}

/// Token proving that `seats` on `flight_id` are held for one order attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seats: BTreeSet<SeatKey>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(flight_id: Uuid, seats: BTreeSet<SeatKey>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_id,
            seats,
            created_at: Utc::now(),
        }
    }

    /// The part of this reservation backing a single seat (used when one
    /// ticket of a multi-seat order is cancelled).
    pub fn for_seat(id: Uuid, flight_id: Uuid, seat: SeatKey) -> Self {
        Self {
            id,
            flight_id,
            seats: BTreeSet::from([seat]),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatOccupancy {
    Open,
    Full,
}

/// Snapshot of a flight's seat state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupancy {
    pub flight_id: Uuid,
    pub capacity: usize,
    pub taken: BTreeSet<SeatKey>,
    pub status: FlightStatus,
    /// Whether new reservations can be accepted: a bookable status backed
    /// by an active aircraft.
    pub bookable: bool,
}

impl Occupancy {
    pub fn held(&self) -> usize {
        self.taken.len()
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.taken.len())
    }

    pub fn state(&self) -> SeatOccupancy {
        if self.held() >= self.capacity {
            SeatOccupancy::Full
        } else {
            SeatOccupancy::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Seat {0} is already taken")]
    SeatTaken(SeatKey),

    #[error("Seat {0} is outside the aircraft layout")]
    SeatOutOfRange(SeatKey),

    #[error("Capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("Flight is not bookable in status {0}")]
    FlightNotBookable(FlightStatus),

    #[error("Flight {0} is operated by an inactive aircraft")]
    AircraftInactive(Uuid),

    #[error("Flight not found: {0}")]
    UnknownFlight(Uuid),

    #[error("Flight {0} is busy, try again")]
    Unavailable(Uuid),

    #[error("Ledger storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// The seat a rejection is about, if it concerns a single seat.
    pub fn seat(&self) -> Option<SeatKey> {
        match self {
            LedgerError::SeatTaken(seat) | LedgerError::SeatOutOfRange(seat) => Some(*seat),
            _ => None,
        }
    }
}

/// Decide whether `requested` may be granted on a flight.
///
/// Shared by every ledger backend so that they reject in the same order:
/// status, layout bounds, capacity, then seat conflicts. Seats are visited in
/// key order, so the first offending seat is deterministic.
pub fn check_reservation(
    layout: &CabinLayout,
    status: FlightStatus,
    held: usize,
    is_taken: impl Fn(&SeatKey) -> bool,
    requested: &BTreeSet<SeatKey>,
) -> Result<(), LedgerError> {
    if !status.is_bookable() {
        return Err(LedgerError::FlightNotBookable(status));
    }

    if let Some(seat) = requested.iter().find(|seat| !layout.contains(seat)) {
        return Err(LedgerError::SeatOutOfRange(*seat));
    }

    let capacity = layout.capacity();
    if held + requested.len() > capacity {
        return Err(LedgerError::CapacityExceeded {
            requested: requested.len(),
            available: capacity.saturating_sub(held),
        });
    }

    if let Some(seat) = requested.iter().find(|seat| is_taken(seat)) {
        return Err(LedgerError::SeatTaken(*seat));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(labels: &[&str]) -> BTreeSet<SeatKey> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_check_order_of_rejections() {
        let layout = CabinLayout::grid(1, 2).unwrap();
        let taken = seats(&["1A"]);

        let result = check_reservation(
            &layout,
            FlightStatus::Cancelled,
            taken.len(),
            |s| taken.contains(s),
            &seats(&["9Z"]),
        );
        assert_eq!(result, Err(LedgerError::FlightNotBookable(FlightStatus::Cancelled)));

        let result = check_reservation(
            &layout,
            FlightStatus::Scheduled,
            taken.len(),
            |s| taken.contains(s),
            &seats(&["1A", "1C"]),
        );
        assert_eq!(result, Err(LedgerError::SeatOutOfRange("1C".parse().unwrap())));

        let result = check_reservation(
            &layout,
            FlightStatus::Scheduled,
            taken.len(),
            |s| taken.contains(s),
            &seats(&["1A"]),
        );
        assert_eq!(result, Err(LedgerError::SeatTaken("1A".parse().unwrap())));

        let result = check_reservation(
            &layout,
            FlightStatus::Scheduled,
            taken.len(),
            |s| taken.contains(s),
            &seats(&["1A", "1B"]),
        );
        assert_eq!(
            result,
            Err(LedgerError::CapacityExceeded { requested: 2, available: 1 })
        );

        assert!(check_reservation(
            &layout,
            FlightStatus::Delayed,
            taken.len(),
            |s| taken.contains(s),
            &seats(&["1B"]),
        )
        .is_ok());
    }

    #[test]
    fn test_occupancy_state() {
        let mut occupancy = Occupancy {
            flight_id: Uuid::new_v4(),
            capacity: 2,
            taken: seats(&["1A"]),
            status: FlightStatus::Scheduled,
            bookable: true,
        };
        assert_eq!(occupancy.state(), SeatOccupancy::Open);
        assert_eq!(occupancy.available(), 1);

        occupancy.taken.insert("1B".parse().unwrap());
        assert_eq!(occupancy.state(), SeatOccupancy::Full);
        assert_eq!(occupancy.available(), 0);
    }
}
