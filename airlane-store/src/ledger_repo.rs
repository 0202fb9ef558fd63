use airlane_core::ledger::{check_reservation, CapacityLedger, LedgerError, Occupancy, Reservation};
use airlane_shared::{CabinLayout, FlightStatus, SeatKey};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{sql_state, LOCK_NOT_AVAILABLE};

/// Capacity ledger backed by Postgres.
///
/// The flight row is the per-flight lock (`SELECT ... FOR UPDATE` under a
/// transaction-local `lock_timeout`), so reservations for one flight are
/// serialized across every server instance. Held seats live in
/// `seat_holds`; a hold stays provisional (with `expires_at`) until the
/// order store confirms it, and provisional holds past their expiry are
/// swept by the next reservation on that flight.
pub struct PgCapacityLedger {
    pool: PgPool,
    lock_wait: Duration,
    hold_ttl: Duration,
}

#[derive(sqlx::FromRow)]
struct FlightSeatingRow {
    status: String,
    aircraft_active: bool,
    rows_count: i32,
    seats_in_row: i32,
    seat_map: Option<serde_json::Value>,
}

impl FlightSeatingRow {
    fn status(&self) -> Result<FlightStatus, LedgerError> {
        self.status.parse().map_err(LedgerError::Storage)
    }

    /// Status of a flight that may take reservations; an inactive aircraft
    /// cannot back one.
    fn bookable_status(&self, flight_id: Uuid) -> Result<FlightStatus, LedgerError> {
        let status = self.status()?;
        if status.is_bookable() && !self.aircraft_active {
            return Err(LedgerError::AircraftInactive(flight_id));
        }
        Ok(status)
    }

    fn layout(&self) -> Result<CabinLayout, LedgerError> {
        let corrupt = |e: String| LedgerError::Storage(format!("invalid cabin layout: {}", e));

        match &self.seat_map {
            Some(map) => {
                let labels: Vec<String> =
                    serde_json::from_value(map.clone()).map_err(|e| corrupt(e.to_string()))?;
                CabinLayout::from_labels(labels.iter().map(String::as_str)).map_err(|e| corrupt(e.to_string()))
            }
            None => {
                let rows = u16::try_from(self.rows_count).map_err(|e| corrupt(e.to_string()))?;
                let seats = u16::try_from(self.seats_in_row).map_err(|e| corrupt(e.to_string()))?;
                CabinLayout::grid(rows, seats).map_err(|e| corrupt(e.to_string()))
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    seat_row: i32,
    seat_number: i32,
}

impl PgCapacityLedger {
    pub fn new(pool: PgPool, lock_wait: Duration, hold_ttl: Duration) -> Self {
        Self { pool, lock_wait, hold_ttl }
    }

    async fn begin_locked(
        &self,
        flight_id: Uuid,
    ) -> Result<(Transaction<'static, Postgres>, FlightSeatingRow), LedgerError> {
        let fail = |e: sqlx::Error| ledger_error(flight_id, e);
        let mut tx = self.pool.begin().await.map_err(fail)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_wait.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        let flight = sqlx::query_as::<_, FlightSeatingRow>(
            r#"
            SELECT f.status, a.is_active AS aircraft_active, a.rows_count, a.seats_in_row, a.seat_map
            FROM flights f
            JOIN aircraft a ON a.id = f.aircraft_id
            WHERE f.id = $1
            FOR UPDATE OF f
            "#,
        )
        .bind(flight_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(fail)?
        .ok_or(LedgerError::UnknownFlight(flight_id))?;

        Ok((tx, flight))
    }
}

#[async_trait]
impl CapacityLedger for PgCapacityLedger {
    async fn try_reserve(
        &self,
        flight_id: Uuid,
        seats: &BTreeSet<SeatKey>,
    ) -> Result<Reservation, LedgerError> {
        let fail = |e: sqlx::Error| ledger_error(flight_id, e);
        let (mut tx, flight) = self.begin_locked(flight_id).await?;

        let swept = sqlx::query(
            "DELETE FROM seat_holds WHERE flight_id = $1 AND expires_at IS NOT NULL AND expires_at <= now()",
        )
        .bind(flight_id)
        .execute(&mut *tx)
        .await
        .map_err(fail)?
        .rows_affected();
        if swept > 0 {
            warn!("Swept {} lapsed seat holds on flight {}", swept, flight_id);
        }

        let taken = held_seats(&mut tx, flight_id).await?;

        // Dropping the transaction rolls it back and releases the row lock
        check_reservation(
            &flight.layout()?,
            flight.bookable_status(flight_id)?,
            taken.len(),
            |seat| taken.contains(seat),
            seats,
        )?;

        let reservation = Reservation::new(flight_id, seats.clone());
        let (rows, numbers) = seat_columns(seats);

        sqlx::query(
            r#"
            INSERT INTO seat_holds (flight_id, seat_row, seat_number, reservation_id, expires_at)
            SELECT $1, r, s, $2, now() + make_interval(secs => $3)
            FROM UNNEST($4::int4[], $5::int4[]) AS t(r, s)
            "#,
        )
        .bind(flight_id)
        .bind(reservation.id)
        .bind(self.hold_ttl.as_secs_f64())
        .bind(&rows)
        .bind(&numbers)
        .execute(&mut *tx)
        .await
        .map_err(fail)?;

        tx.commit().await.map_err(fail)?;

        info!(
            "Reserved {} seats on flight {} under {}",
            seats.len(),
            flight_id,
            reservation.id
        );
        Ok(reservation)
    }

    async fn release(&self, reservation: &Reservation) -> Result<(), LedgerError> {
        let flight_id = reservation.flight_id;
        let fail = |e: sqlx::Error| ledger_error(flight_id, e);
        let (mut tx, _) = self.begin_locked(flight_id).await?;
        let (rows, numbers) = seat_columns(&reservation.seats);

        let released = sqlx::query(
            r#"
            DELETE FROM seat_holds h
            USING UNNEST($3::int4[], $4::int4[]) AS t(r, s)
            WHERE h.flight_id = $1
              AND h.reservation_id = $2
              AND h.seat_row = t.r
              AND h.seat_number = t.s
            "#,
        )
        .bind(flight_id)
        .bind(reservation.id)
        .bind(&rows)
        .bind(&numbers)
        .execute(&mut *tx)
        .await
        .map_err(fail)?
        .rows_affected();

        tx.commit().await.map_err(fail)?;

        debug!(
            "Released {} of {} seats of reservation {} on flight {}",
            released,
            reservation.seats.len(),
            reservation.id,
            flight_id
        );
        Ok(())
    }

    async fn occupancy(&self, flight_id: Uuid) -> Result<Occupancy, LedgerError> {
        let fail = |e: sqlx::Error| ledger_error(flight_id, e);

        let flight = sqlx::query_as::<_, FlightSeatingRow>(
            r#"
            SELECT f.status, a.is_active AS aircraft_active, a.rows_count, a.seats_in_row, a.seat_map
            FROM flights f
            JOIN aircraft a ON a.id = f.aircraft_id
            WHERE f.id = $1
            "#,
        )
        .bind(flight_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(fail)?
        .ok_or(LedgerError::UnknownFlight(flight_id))?;

        let mut conn = self.pool.acquire().await.map_err(fail)?;
        let taken = held_seats(&mut conn, flight_id).await?;
        let status = flight.status()?;

        Ok(Occupancy {
            flight_id,
            capacity: flight.layout()?.capacity(),
            taken,
            status,
            bookable: status.is_bookable() && flight.aircraft_active,
        })
    }
}

/// Seats currently held on a flight, ignoring lapsed provisional holds
async fn held_seats(
    conn: &mut sqlx::PgConnection,
    flight_id: Uuid,
) -> Result<BTreeSet<SeatKey>, LedgerError> {
    let rows = sqlx::query_as::<_, HoldRow>(
        r#"
        SELECT seat_row, seat_number
        FROM seat_holds
        WHERE flight_id = $1 AND (expires_at IS NULL OR expires_at > now())
        "#,
    )
    .bind(flight_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| ledger_error(flight_id, e))?;

    rows.into_iter()
        .map(|row| {
            SeatKey::new(row.seat_row.into(), row.seat_number.into())
                .map_err(|e| LedgerError::Storage(e.to_string()))
        })
        .collect()
}

fn seat_columns(seats: &BTreeSet<SeatKey>) -> (Vec<i32>, Vec<i32>) {
    seats
        .iter()
        .map(|s| (i32::from(s.row), i32::from(s.seat)))
        .unzip()
}

fn ledger_error(flight_id: Uuid, err: sqlx::Error) -> LedgerError {
    if sql_state(&err).as_deref() == Some(LOCK_NOT_AVAILABLE) {
        warn!("Timed out waiting for seat lock on flight {}", flight_id);
        return LedgerError::Unavailable(flight_id);
    }
    if matches!(err, sqlx::Error::PoolTimedOut) {
        return LedgerError::Unavailable(flight_id);
    }
    LedgerError::Storage(err.to_string())
}
