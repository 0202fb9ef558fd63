use airlane_core::ledger::{check_reservation, CapacityLedger, LedgerError, Occupancy, Reservation};
use airlane_shared::{CabinLayout, FlightStatus, SeatKey};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aircraft::{Aircraft, AircraftError};
use crate::flight::Flight;

/// Seat state of one flight. `held` maps each taken seat to the
/// reservation that holds it.
#[derive(Debug)]
struct FlightSeats {
    layout: CabinLayout,
    status: FlightStatus,
    held: HashMap<SeatKey, Uuid>,
}

/// In-process capacity ledger with one mutex per flight.
///
/// Suitable for a single server instance and for tests; multi-instance
/// deployments use the Postgres ledger in `airlane-store`.
pub struct InMemoryCapacityLedger {
    flights: RwLock<HashMap<Uuid, Arc<Mutex<FlightSeats>>>>,
    lock_wait: Duration,
}

impl InMemoryCapacityLedger {
    pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_lock_wait(Self::DEFAULT_LOCK_WAIT)
    }

    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            flights: RwLock::new(HashMap::new()),
            lock_wait,
        }
    }

    /// Make a flight bookable with the capacity of its aircraft
    pub async fn register_flight(&self, flight: &Flight, aircraft: &Aircraft) -> Result<(), AircraftError> {
        if !aircraft.is_active {
            return Err(AircraftError::Inactive(aircraft.id));
        }
        self.register_layout(flight.id, aircraft.layout.clone(), flight.status).await;
        Ok(())
    }

    /// Register a flight's seat layout. Capacity is fixed once registered:
    /// re-registering only updates the status and keeps existing holds.
    pub async fn register_layout(&self, flight_id: Uuid, layout: CabinLayout, status: FlightStatus) {
        let mut flights = self.flights.write().await;
        match flights.get(&flight_id) {
            Some(existing) => {
                let mut seats = existing.lock().await;
                if seats.layout != layout {
                    warn!("Ignoring layout change for flight {}, capacity is fixed", flight_id);
                }
                seats.status = status;
            }
            None => {
                info!("Registered flight {} with capacity {}", flight_id, layout.capacity());
                flights.insert(
                    flight_id,
                    Arc::new(Mutex::new(FlightSeats {
                        layout,
                        status,
                        held: HashMap::new(),
                    })),
                );
            }
        }
    }

    /// Track a status change of the flight (departure, cancellation, ...)
    pub async fn set_status(&self, flight_id: Uuid, status: FlightStatus) -> Result<(), LedgerError> {
        let mut seats = self.lock(flight_id).await?;
        seats.status = status;
        info!("Flight {} status -> {}", flight_id, status);
        Ok(())
    }

    async fn lock(&self, flight_id: Uuid) -> Result<OwnedMutexGuard<FlightSeats>, LedgerError> {
        let entry = self
            .flights
            .read()
            .await
            .get(&flight_id)
            .cloned()
            .ok_or(LedgerError::UnknownFlight(flight_id))?;

        tokio::time::timeout(self.lock_wait, entry.lock_owned())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for seat lock on flight {}", flight_id);
                LedgerError::Unavailable(flight_id)
            })
    }
}

impl Default for InMemoryCapacityLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapacityLedger for InMemoryCapacityLedger {
    async fn try_reserve(
        &self,
        flight_id: Uuid,
        seats: &BTreeSet<SeatKey>,
    ) -> Result<Reservation, LedgerError> {
        let mut state = self.lock(flight_id).await?;

        if let Err(e) = check_reservation(
            &state.layout,
            state.status,
            state.held.len(),
            |seat| state.held.contains_key(seat),
            seats,
        ) {
            debug!("Reservation on flight {} rejected: {}", flight_id, e);
            return Err(e);
        }

        let reservation = Reservation::new(flight_id, seats.clone());
        for seat in seats {
            state.held.insert(*seat, reservation.id);
        }

        debug!(
            "Reserved {} seat(s) on flight {} ({}/{} held)",
            seats.len(),
            flight_id,
            state.held.len(),
            state.layout.capacity()
        );
        Ok(reservation)
    }

    async fn release(&self, reservation: &Reservation) -> Result<(), LedgerError> {
        let mut state = self.lock(reservation.flight_id).await?;

        let mut released = 0;
        for seat in &reservation.seats {
            if state.held.get(seat) == Some(&reservation.id) {
                state.held.remove(seat);
                released += 1;
            }
        }

        debug!(
            "Released {} seat(s) of reservation {} on flight {}",
            released, reservation.id, reservation.flight_id
        );
        Ok(())
    }

    async fn occupancy(&self, flight_id: Uuid) -> Result<Occupancy, LedgerError> {
        let state = self.lock(flight_id).await?;
        Ok(Occupancy {
            flight_id,
            capacity: state.layout.capacity(),
            taken: state.held.keys().copied().collect(),
            status: state.status,
            bookable: state.status.is_bookable(),
        })
    }
}
