use airlane_shared::{SeatDesignator, SeatKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Ticket status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }
}

/// One seat on one flight, owned by an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub flight_id: Uuid,
    pub seat: SeatKey,
    pub price_cents: Option<i64>,
    /// Ledger reservation backing this seat
    pub reservation_id: Uuid,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }

    /// Terminal; a cancelled ticket is never reactivated
    pub fn cancel(&mut self) {
        self.status = TicketStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
    }
}

/// A user's purchase: created together with all of its tickets, never
/// edited afterwards except for ticket cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub tickets: Vec<Ticket>,
    pub total_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn active_tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.iter().filter(|t| t.is_active())
    }

    pub fn flight_ids(&self) -> Vec<Uuid> {
        self.tickets
            .iter()
            .map(|t| t.flight_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Seat requested for an order, as received from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub flight_id: Uuid,
    #[serde(flatten)]
    pub seat: SeatDesignator,
    #[serde(default)]
    pub price_cents: Option<i64>,
}

impl TicketRequest {
    pub fn new(flight_id: Uuid, seat: impl Into<SeatDesignator>) -> Self {
        Self {
            flight_id,
            seat: seat.into(),
            price_cents: None,
        }
    }

    pub fn with_price(mut self, price_cents: i64) -> Self {
        self.price_cents = Some(price_cents);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_request_accepts_both_seat_forms() {
        let flight_id = Uuid::new_v4();
        let numeric: TicketRequest = serde_json::from_value(serde_json::json!({
            "flight_id": flight_id,
            "row": 7,
            "seat": 2,
            "price_cents": 12000
        }))
        .unwrap();
        let label: TicketRequest = serde_json::from_value(serde_json::json!({
            "flight_id": flight_id,
            "seat": "7B"
        }))
        .unwrap();

        assert_eq!(numeric.seat.normalize().unwrap(), label.seat.normalize().unwrap());
        assert_eq!(numeric.price_cents, Some(12000));
        assert_eq!(label.price_cents, None);
    }
}
