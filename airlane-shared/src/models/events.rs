use uuid::Uuid;

use crate::models::seat::SeatKey;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub flight_ids: Vec<Uuid>,
    pub ticket_count: usize,
    pub total_price_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketCancelledEvent {
    pub ticket_id: Uuid,
    pub order_id: Uuid,
    pub flight_id: Uuid,
    pub seat: SeatKey,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct RouteCreatedEvent {
    pub route_id: Uuid,
    pub source_airport_id: Uuid,
    pub destination_airport_id: Uuid,
    pub distance_km: u32,
    pub timestamp: i64,
}

pub const ORDERS_PLACED_TOPIC: &str = "orders.placed";
pub const TICKETS_CANCELLED_TOPIC: &str = "tickets.cancelled";
pub const ROUTES_CREATED_TOPIC: &str = "routes.created";
