use airlane_core::ledger::Reservation;
use airlane_core::repository::StoreError;
use airlane_order::models::{Order, Ticket, TicketStatus};
use airlane_order::store::OrderStore;
use airlane_shared::SeatKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{sql_state, UNIQUE_VIOLATION};

/// Orders and tickets in Postgres. Persisting an order also confirms the
/// seat holds taken by [`crate::PgCapacityLedger`] in the same transaction.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    total_price_cents: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    flight_id: Uuid,
    seat_row: i32,
    seat_number: i32,
    price_cents: Option<i64>,
    reservation_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let seat = SeatKey::new(row.seat_row.into(), row.seat_number.into())
            .map_err(|e| StoreError::Database(format!("ticket {}: {}", row.id, e)))?;
        let status = match row.status.as_str() {
            "ACTIVE" => TicketStatus::Active,
            "CANCELLED" => TicketStatus::Cancelled,
            other => {
                return Err(StoreError::Database(format!(
                    "ticket {}: unknown status {}",
                    row.id, other
                )))
            }
        };

        Ok(Ticket {
            id: row.id,
            order_id: row.order_id,
            flight_id: row.flight_id,
            seat,
            price_cents: row.price_cents,
            reservation_id: row.reservation_id,
            status,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

const TICKET_COLUMNS: &str = "id, order_id, flight_id, seat_row, seat_number, price_cents, \
                              reservation_id, status, created_at, cancelled_at";

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

impl PgOrderStore {
    async fn tickets_of(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Ticket>>, StoreError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE order_id = ANY($1) ORDER BY created_at, seat_row, seat_number",
            TICKET_COLUMNS
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut by_order: HashMap<Uuid, Vec<Ticket>> = HashMap::new();
        for row in rows {
            let ticket = Ticket::try_from(row)?;
            by_order.entry(ticket.order_id).or_default().push(ticket);
        }
        Ok(by_order)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn persist_order(&self, order: &Order, reservations: &[Reservation]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, total_price_cents, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.total_price_cents)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        for ticket in &order.tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (id, order_id, flight_id, seat_row, seat_number, price_cents, reservation_id, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(ticket.id)
            .bind(order.id)
            .bind(ticket.flight_id)
            .bind(i32::from(ticket.seat.row))
            .bind(i32::from(ticket.seat.seat))
            .bind(ticket.price_cents)
            .bind(ticket.reservation_id)
            .bind(ticket.status.as_str())
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if sql_state(&e).as_deref() == Some(UNIQUE_VIOLATION) {
                    StoreError::Conflict(format!("seat {} on flight {}", ticket.seat, ticket.flight_id))
                } else {
                    db_error(e)
                }
            })?;
        }

        // Promote provisional holds to permanent ones; a lapsed hold may
        // already belong to someone else, so the whole order is abandoned.
        for reservation in reservations {
            let confirmed = sqlx::query(
                r#"
                UPDATE seat_holds
                SET expires_at = NULL
                WHERE reservation_id = $1
                  AND flight_id = $2
                  AND (expires_at IS NULL OR expires_at > now())
                "#,
            )
            .bind(reservation.id)
            .bind(reservation.flight_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

            if confirmed != reservation.seats.len() as u64 {
                warn!(
                    "Reservation {} confirmed {} of {} seats, abandoning order {}",
                    reservation.id,
                    confirmed,
                    reservation.seats.len(),
                    order.id
                );
                return Err(StoreError::ReservationLapsed(reservation.id));
            }
        }

        tx.commit().await.map_err(db_error)?;
        info!("Persisted order {} with {} tickets", order.id, order.tickets.len());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_price_cents, created_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut tickets = self.tickets_of(&[row.id]).await?;
        Ok(Some(Order {
            id: row.id,
            user_id: row.user_id,
            tickets: tickets.remove(&row.id).unwrap_or_default(),
            total_price_cents: row.total_price_cents,
            created_at: row.created_at,
        }))
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, total_price_cents, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut tickets = self.tickets_of(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| Order {
                tickets: tickets.remove(&row.id).unwrap_or_default(),
                id: row.id,
                user_id: row.user_id,
                total_price_cents: row.total_price_cents,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn cancel_ticket(&self, id: Uuid) -> Result<Ticket, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE id = $1 FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound(format!("ticket {}", id)))?;

        let mut ticket = Ticket::try_from(row)?;
        if !ticket.is_active() {
            return Err(StoreError::Conflict(format!("ticket {} already cancelled", id)));
        }
        ticket.cancel();

        sqlx::query("UPDATE tickets SET status = $2, cancelled_at = $3 WHERE id = $1")
            .bind(id)
            .bind(ticket.status.as_str())
            .bind(ticket.cancelled_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        // Free the seat in the same transaction; the ledger release that
        // follows finds nothing left to do.
        delete_holds(&mut tx, std::slice::from_ref(&ticket)).await?;

        tx.commit().await.map_err(db_error)?;
        Ok(ticket)
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE order_id = $1 AND status = 'ACTIVE' ORDER BY seat_row, seat_number FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut tickets = rows.into_iter().map(Ticket::try_from).collect::<Result<Vec<_>, _>>()?;
        if tickets.is_empty() {
            return Err(StoreError::Conflict(format!("order {} has no active tickets", order_id)));
        }
        let cancelled_at = Utc::now();
        for ticket in &mut tickets {
            ticket.status = TicketStatus::Cancelled;
            ticket.cancelled_at = Some(cancelled_at);
        }

        let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
        sqlx::query("UPDATE tickets SET status = $2, cancelled_at = $3 WHERE id = ANY($1)")
            .bind(&ids)
            .bind(TicketStatus::Cancelled.as_str())
            .bind(cancelled_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        delete_holds(&mut tx, &tickets).await?;

        tx.commit().await.map_err(db_error)?;
        info!("Cancelled {} tickets of order {}", tickets.len(), order_id);
        Ok(tickets)
    }
}

async fn delete_holds(
    tx: &mut Transaction<'_, Postgres>,
    tickets: &[Ticket],
) -> Result<(), StoreError> {
    let flight_ids: Vec<Uuid> = tickets.iter().map(|t| t.flight_id).collect();
    let rows: Vec<i32> = tickets.iter().map(|t| i32::from(t.seat.row)).collect();
    let seats: Vec<i32> = tickets.iter().map(|t| i32::from(t.seat.seat)).collect();
    let reservation_ids: Vec<Uuid> = tickets.iter().map(|t| t.reservation_id).collect();

    sqlx::query(
        r#"
        DELETE FROM seat_holds h
        USING UNNEST($1::uuid[], $2::int4[], $3::int4[], $4::uuid[])
            AS t(flight_id, seat_row, seat_number, reservation_id)
        WHERE h.flight_id = t.flight_id
          AND h.seat_row = t.seat_row
          AND h.seat_number = t.seat_number
          AND h.reservation_id = t.reservation_id
        "#,
    )
    .bind(&flight_ids)
    .bind(&rows)
    .bind(&seats)
    .bind(&reservation_ids)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> TicketRow {
        TicketRow {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            seat_row: 12,
            seat_number: 3,
            price_cents: Some(4_200),
            reservation_id: Uuid::new_v4(),
            status: status.into(),
            created_at: Utc::now(),
            cancelled_at: None,
        }
    }

    #[test]
    fn test_ticket_row_conversion() {
        let ticket = Ticket::try_from(row("ACTIVE")).unwrap();
        assert_eq!(ticket.seat.to_string(), "12C");
        assert!(ticket.is_active());

        let ticket = Ticket::try_from(row("CANCELLED")).unwrap();
        assert_eq!(ticket.status, TicketStatus::Cancelled);
    }

    #[test]
    fn test_corrupt_ticket_rows_are_rejected() {
        assert!(matches!(Ticket::try_from(row("REFUNDED")), Err(StoreError::Database(_))));

        let mut bad_seat = row("ACTIVE");
        bad_seat.seat_row = 0;
        assert!(matches!(Ticket::try_from(bad_seat), Err(StoreError::Database(_))));
    }
}
