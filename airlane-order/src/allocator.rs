use airlane_core::events::{publish_json, EventPublisher};
use airlane_core::ledger::{CapacityLedger, LedgerError, Occupancy, Reservation};
use airlane_core::repository::StoreError;
use airlane_shared::events::{
    OrderPlacedEvent, TicketCancelledEvent, ORDERS_PLACED_TOPIC, TICKETS_CANCELLED_TOPIC,
};
use airlane_shared::SeatKey;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Order, Ticket, TicketRequest, TicketStatus};
use crate::store::OrderStore;

/// Orchestrates order placement: validate, reserve per flight, persist,
/// roll back on any failure, then announce.
pub struct OrderAllocator {
    ledger: Arc<dyn CapacityLedger>,
    store: Arc<dyn OrderStore>,
    events: Option<Arc<dyn EventPublisher>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Flight {flight_id} rejected the order: {reason}")]
    Rejected { flight_id: Uuid, reason: LedgerError },

    #[error("Flight {flight_id} is busy, try again")]
    Unavailable { flight_id: Uuid },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Order storage failure: {0}")]
    Storage(String),
}

/// A validated, normalized line of an order
struct Line {
    flight_id: Uuid,
    seat: SeatKey,
    price_cents: Option<i64>,
}

impl OrderAllocator {
    pub fn new(ledger: Arc<dyn CapacityLedger>, store: Arc<dyn OrderStore>) -> Self {
        Self {
            ledger,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn place_order(
        &self,
        user_id: &str,
        requests: &[TicketRequest],
    ) -> Result<Order, AllocationError> {
        let user_id = user_id.trim();
        let (lines, total_price_cents) = validate(user_id, requests)?;

        // BTreeMap keeps the reservation order stable across attempts
        let mut groups: BTreeMap<Uuid, BTreeSet<SeatKey>> = BTreeMap::new();
        for line in &lines {
            groups.entry(line.flight_id).or_default().insert(line.seat);
        }

        let mut reservations: Vec<Reservation> = Vec::with_capacity(groups.len());
        for (flight_id, seats) in &groups {
            match self.ledger.try_reserve(*flight_id, seats).await {
                Ok(reservation) => reservations.push(reservation),
                Err(e) => {
                    info!("Order for user {} rejected on flight {}: {}", user_id, flight_id, e);
                    self.roll_back(&reservations).await;
                    return Err(ledger_failure(*flight_id, e));
                }
            }
        }

        let order_id = Uuid::new_v4();
        let created_at = Utc::now();
        let reservation_of: BTreeMap<Uuid, Uuid> =
            reservations.iter().map(|r| (r.flight_id, r.id)).collect();

        let tickets: Vec<Ticket> = lines
            .iter()
            .map(|line| Ticket {
                id: Uuid::new_v4(),
                order_id,
                flight_id: line.flight_id,
                seat: line.seat,
                price_cents: line.price_cents,
                reservation_id: reservation_of[&line.flight_id],
                status: TicketStatus::Active,
                created_at,
                cancelled_at: None,
            })
            .collect();

        let order = Order {
            id: order_id,
            user_id: user_id.to_string(),
            total_price_cents,
            tickets,
            created_at,
        };

        if let Err(e) = self.store.persist_order(&order, &reservations).await {
            error!("Failed to persist order {}: {}", order.id, e);
            self.roll_back(&reservations).await;
            return Err(match e {
                StoreError::ReservationLapsed(reservation_id) => {
                    let flight_id = reservations
                        .iter()
                        .find(|r| r.id == reservation_id)
                        .map(|r| r.flight_id)
                        .unwrap_or_default();
                    AllocationError::Unavailable { flight_id }
                }
                other => AllocationError::Storage(other.to_string()),
            });
        }

        info!(
            "Order {} committed for user {}: {} tickets on {} flights",
            order.id,
            order.user_id,
            order.tickets.len(),
            groups.len()
        );

        let event = OrderPlacedEvent {
            order_id: order.id,
            user_id: order.user_id.clone(),
            flight_ids: order.flight_ids(),
            ticket_count: order.tickets.len(),
            total_price_cents: order.total_price_cents,
            timestamp: created_at.timestamp(),
        };
        publish_json(
            self.events.as_deref(),
            ORDERS_PLACED_TOPIC,
            &order.id.to_string(),
            &event,
        )
        .await;

        Ok(order)
    }

    /// Cancel one ticket and free its seat for the next order.
    pub async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Ticket, AllocationError> {
        let ticket = self.store.cancel_ticket(ticket_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => AllocationError::NotFound(format!("ticket {}", ticket_id)),
            StoreError::Conflict(_) => AllocationError::AlreadyCancelled(format!("ticket {}", ticket_id)),
            other => AllocationError::Storage(other.to_string()),
        })?;

        self.after_cancel(&ticket).await;
        Ok(ticket)
    }

    /// Cancel every active ticket of an order. The store cancels them all
    /// or none.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, AllocationError> {
        let cancelled = self.store.cancel_order(order_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => AllocationError::NotFound(format!("order {}", order_id)),
            StoreError::Conflict(_) => AllocationError::AlreadyCancelled(format!("order {}", order_id)),
            other => AllocationError::Storage(other.to_string()),
        })?;

        for ticket in &cancelled {
            self.after_cancel(ticket).await;
        }
        info!("Order {} cancelled, {} seats freed", order_id, cancelled.len());

        self.get_order(order_id).await
    }

    /// Free the seat of a cancelled ticket and announce it.
    async fn after_cancel(&self, ticket: &Ticket) {
        // The ticket record is authoritative; a failed release only delays reuse
        let held = Reservation::for_seat(ticket.reservation_id, ticket.flight_id, ticket.seat);
        if let Err(e) = self.ledger.release(&held).await {
            warn!(
                "Ticket {} cancelled but seat {} on flight {} was not released: {}",
                ticket.id, ticket.seat, ticket.flight_id, e
            );
        }

        info!("Ticket {} cancelled, seat {} on flight {} freed", ticket.id, ticket.seat, ticket.flight_id);

        let event = TicketCancelledEvent {
            ticket_id: ticket.id,
            order_id: ticket.order_id,
            flight_id: ticket.flight_id,
            seat: ticket.seat,
            timestamp: Utc::now().timestamp(),
        };
        publish_json(
            self.events.as_deref(),
            TICKETS_CANCELLED_TOPIC,
            &ticket.order_id.to_string(),
            &event,
        )
        .await;
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, AllocationError> {
        self.store
            .get_order(order_id)
            .await
            .map_err(|e| AllocationError::Storage(e.to_string()))?
            .ok_or_else(|| AllocationError::NotFound(format!("order {}", order_id)))
    }

    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, AllocationError> {
        self.store
            .list_orders(user_id)
            .await
            .map_err(|e| AllocationError::Storage(e.to_string()))
    }

    pub async fn occupancy(&self, flight_id: Uuid) -> Result<Occupancy, AllocationError> {
        self.ledger
            .occupancy(flight_id)
            .await
            .map_err(|e| ledger_failure(flight_id, e))
    }

    async fn roll_back(&self, reservations: &[Reservation]) {
        for reservation in reservations {
            match self.ledger.release(reservation).await {
                Ok(()) => debug!(
                    "Rolled back reservation {} on flight {}",
                    reservation.id, reservation.flight_id
                ),
                Err(e) => error!(
                    "Failed to roll back reservation {} on flight {}: {}",
                    reservation.id, reservation.flight_id, e
                ),
            }
        }
    }
}

/// Returns the normalized lines and the order total.
fn validate(user_id: &str, requests: &[TicketRequest]) -> Result<(Vec<Line>, i64), AllocationError> {
    if user_id.is_empty() {
        return Err(AllocationError::Validation("user_id must not be empty".into()));
    }
    if requests.is_empty() {
        return Err(AllocationError::Validation("order must contain at least one ticket".into()));
    }

    let mut seen = HashSet::with_capacity(requests.len());
    let mut lines = Vec::with_capacity(requests.len());
    let mut total: i64 = 0;

    for (i, request) in requests.iter().enumerate() {
        let seat = request
            .seat
            .normalize()
            .map_err(|e| AllocationError::Validation(format!("tickets[{}]: {}", i, e)))?;

        if let Some(price) = request.price_cents {
            if price < 0 {
                return Err(AllocationError::Validation(format!(
                    "tickets[{}]: price must not be negative",
                    i
                )));
            }
            total = total.checked_add(price).ok_or_else(|| {
                AllocationError::Validation(format!("tickets[{}]: order total overflows", i))
            })?;
        }

        if !seen.insert((request.flight_id, seat)) {
            return Err(AllocationError::Validation(format!(
                "tickets[{}]: seat {} on flight {} requested twice",
                i, seat, request.flight_id
            )));
        }

        lines.push(Line {
            flight_id: request.flight_id,
            seat,
            price_cents: request.price_cents,
        });
    }

    Ok((lines, total))
}

fn ledger_failure(flight_id: Uuid, err: LedgerError) -> AllocationError {
    match err {
        LedgerError::Unavailable(_) => AllocationError::Unavailable { flight_id },
        LedgerError::UnknownFlight(id) => AllocationError::NotFound(format!("flight {}", id)),
        LedgerError::Storage(msg) => AllocationError::Storage(msg),
        reason => AllocationError::Rejected { flight_id, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOrderStore;
    use airlane_catalog::InMemoryCapacityLedger;
    use airlane_shared::{CabinLayout, FlightStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn seat(label: &str) -> SeatKey {
        label.parse().unwrap()
    }

    async fn flight(ledger: &InMemoryCapacityLedger, rows: u16, seats_in_row: u16) -> Uuid {
        let id = Uuid::new_v4();
        ledger
            .register_layout(id, CabinLayout::grid(rows, seats_in_row).unwrap(), FlightStatus::Scheduled)
            .await;
        id
    }

    fn allocator(ledger: Arc<InMemoryCapacityLedger>, store: Arc<dyn OrderStore>) -> OrderAllocator {
        OrderAllocator::new(ledger, store)
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            _payload: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.sent.lock().unwrap().push((topic.to_string(), key.to_string()));
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl OrderStore for FailingStore {
        async fn persist_order(&self, _order: &Order, _reservations: &[Reservation]) -> Result<(), StoreError> {
            Err(StoreError::Database("connection reset".into()))
        }
        async fn get_order(&self, _id: Uuid) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }
        async fn list_orders(&self, _user_id: &str) -> Result<Vec<Order>, StoreError> {
            Ok(Vec::new())
        }
        async fn cancel_ticket(&self, id: Uuid) -> Result<Ticket, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
        async fn cancel_order(&self, id: Uuid) -> Result<Vec<Ticket>, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    /// Delegates to an in-memory ledger but reports one flight as busy
    struct BusyFlightLedger {
        inner: Arc<InMemoryCapacityLedger>,
        busy: Uuid,
    }

    #[async_trait]
    impl CapacityLedger for BusyFlightLedger {
        async fn try_reserve(&self, flight_id: Uuid, seats: &BTreeSet<SeatKey>) -> Result<Reservation, LedgerError> {
            if flight_id == self.busy {
                return Err(LedgerError::Unavailable(flight_id));
            }
            self.inner.try_reserve(flight_id, seats).await
        }
        async fn release(&self, reservation: &Reservation) -> Result<(), LedgerError> {
            self.inner.release(reservation).await
        }
        async fn occupancy(&self, flight_id: Uuid) -> Result<Occupancy, LedgerError> {
            self.inner.occupancy(flight_id).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_orders_race_for_one_seat() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 1, 2).await;
        let allocator = Arc::new(allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new())));

        let handles: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|user| {
                let allocator = allocator.clone();
                tokio::spawn(async move {
                    allocator
                        .place_order(user, &[TicketRequest::new(flight_id, seat("1A"))])
                        .await
                })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(order) => {
                    won += 1;
                    assert_eq!(order.tickets[0].seat, seat("1A"));
                }
                Err(AllocationError::Rejected { flight_id: f, reason }) => {
                    assert_eq!(f, flight_id);
                    assert_eq!(reason, LedgerError::SeatTaken(seat("1A")));
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 1);
    }

    #[tokio::test]
    async fn test_full_flight_reopens_after_cancellation() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 30, 6).await;
        let allocator = allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new()));

        let everything: Vec<TicketRequest> = (1..=30)
            .flat_map(|row| (1..=6).map(move |s| TicketRequest::new(flight_id, SeatKey::new(row, s).unwrap())))
            .collect();
        let charter = allocator.place_order("charter", &everything).await.unwrap();
        assert_eq!(charter.tickets.len(), 180);

        let late = [TicketRequest::new(flight_id, seat("12C"))];
        let err = allocator.place_order("late", &late).await.unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Rejected {
                reason: LedgerError::CapacityExceeded { requested: 1, available: 0 },
                ..
            }
        ));

        let freed = charter.tickets.iter().find(|t| t.seat == seat("12C")).unwrap();
        allocator.cancel_ticket(freed.id).await.unwrap();

        let order = allocator.place_order("late", &late).await.unwrap();
        assert_eq!(order.tickets[0].seat, seat("12C"));
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 180);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_oversubscription_by_one_rejects_exactly_one() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 2, 5).await;
        let store = Arc::new(InMemoryOrderStore::new());
        let allocator = Arc::new(allocator(ledger.clone(), store.clone()));

        // Ten distinct seats fill the cabin; the eleventh request repeats one
        let mut wanted: Vec<SeatKey> = (1..=2)
            .flat_map(|row| (1..=5).map(move |s| SeatKey::new(row, s).unwrap()))
            .collect();
        wanted.push(seat("1A"));

        let handles: Vec<_> = wanted
            .into_iter()
            .enumerate()
            .map(|(i, key)| {
                let allocator = allocator.clone();
                tokio::spawn(async move {
                    allocator
                        .place_order(&format!("user-{i}"), &[TicketRequest::new(flight_id, key)])
                        .await
                })
            })
            .collect();

        let mut rejected = 0;
        for handle in handles {
            if handle.await.unwrap().is_err() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);

        let tickets = store.tickets().await;
        let seats: HashSet<SeatKey> = tickets.iter().filter(|t| t.is_active()).map(|t| t.seat).collect();
        assert_eq!(tickets.len(), 10);
        assert_eq!(seats.len(), 10);
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 10);
    }

    #[tokio::test]
    async fn test_multi_flight_failure_rolls_back_earlier_holds() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let first = flight(&ledger, 5, 4).await;
        let second = flight(&ledger, 5, 4).await;
        let allocator = allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new()));

        allocator
            .place_order("early", &[TicketRequest::new(second, seat("2B"))])
            .await
            .unwrap();

        let err = allocator
            .place_order(
                "trip",
                &[
                    TicketRequest::new(first, seat("1A")),
                    TicketRequest::new(second, seat("2B")),
                ],
            )
            .await
            .unwrap_err();

        match err {
            AllocationError::Rejected { flight_id, reason } => {
                assert_eq!(flight_id, second);
                assert_eq!(reason.seat(), Some(seat("2B")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ledger.occupancy(first).await.unwrap().held(), 0);
        assert_eq!(ledger.occupancy(second).await.unwrap().held(), 1);
    }

    #[tokio::test]
    async fn test_busy_flight_surfaces_unavailable_and_releases_holds() {
        let inner = Arc::new(InMemoryCapacityLedger::new());
        let free = flight(&inner, 5, 4).await;
        let busy = flight(&inner, 5, 4).await;
        let ledger = Arc::new(BusyFlightLedger { inner: inner.clone(), busy });
        let allocator = OrderAllocator::new(ledger, Arc::new(InMemoryOrderStore::new()));

        let err = allocator
            .place_order(
                "trip",
                &[TicketRequest::new(free, seat("1A")), TicketRequest::new(busy, seat("1A"))],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AllocationError::Unavailable { flight_id } if flight_id == busy));
        assert_eq!(inner.occupancy(free).await.unwrap().held(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_releases_reservations() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 5, 4).await;
        let events = Arc::new(RecordingPublisher::default());
        let allocator = allocator(ledger.clone(), Arc::new(FailingStore)).with_events(events.clone());

        let err = allocator
            .place_order("alice", &[TicketRequest::new(flight_id, seat("3C"))])
            .await
            .unwrap_err();

        assert!(matches!(err, AllocationError::Storage(_)));
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 0);
        assert!(events.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_the_ledger() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 5, 4).await;
        let allocator = allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new()));

        assert!(matches!(
            allocator.place_order("alice", &[]).await,
            Err(AllocationError::Validation(_))
        ));
        assert!(matches!(
            allocator.place_order("  ", &[TicketRequest::new(flight_id, seat("1A"))]).await,
            Err(AllocationError::Validation(_))
        ));

        let duplicate = [
            TicketRequest::new(flight_id, seat("1A")),
            TicketRequest::new(flight_id, SeatKey::new(1, 1).unwrap()),
        ];
        match allocator.place_order("alice", &duplicate).await {
            Err(AllocationError::Validation(msg)) => assert!(msg.starts_with("tickets[1]")),
            other => panic!("unexpected result: {other:?}"),
        }

        let malformed = [TicketRequest {
            flight_id,
            seat: airlane_shared::SeatDesignator::Label { seat: "A12".into() },
            price_cents: None,
        }];
        assert!(matches!(
            allocator.place_order("alice", &malformed).await,
            Err(AllocationError::Validation(_))
        ));

        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_and_unknown_flight() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 2, 2).await;
        let allocator = allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new()));

        let err = allocator
            .place_order("alice", &[TicketRequest::new(flight_id, seat("3A"))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Rejected { reason: LedgerError::SeatOutOfRange(_), .. }
        ));

        let err = allocator
            .place_order("alice", &[TicketRequest::new(Uuid::new_v4(), seat("1A"))])
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_order_totals_history_and_cancellation() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 5, 4).await;
        let events = Arc::new(RecordingPublisher::default());
        let allocator =
            allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new())).with_events(events.clone());

        let first = allocator
            .place_order(
                "alice",
                &[
                    TicketRequest::new(flight_id, seat("1A")).with_price(12_000),
                    TicketRequest::new(flight_id, seat("1B")).with_price(9_500),
                ],
            )
            .await
            .unwrap();
        assert_eq!(first.total_price_cents, 21_500);
        assert_eq!(first.tickets[0].reservation_id, first.tickets[1].reservation_id);

        let second = allocator
            .place_order("alice", &[TicketRequest::new(flight_id, seat("2A"))])
            .await
            .unwrap();
        assert_eq!(second.total_price_cents, 0);

        let history = allocator.list_orders("alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at >= history[1].created_at);

        let cancelled = allocator.cancel_order(first.id).await.unwrap();
        assert_eq!(cancelled.active_tickets().count(), 0);
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 1);

        assert!(matches!(
            allocator.cancel_order(first.id).await,
            Err(AllocationError::AlreadyCancelled(_))
        ));
        assert!(matches!(
            allocator.cancel_ticket(first.tickets[0].id).await,
            Err(AllocationError::AlreadyCancelled(_))
        ));
        assert!(matches!(
            allocator.get_order(Uuid::new_v4()).await,
            Err(AllocationError::NotFound(_))
        ));

        let sent = events.sent.lock().unwrap();
        let placed = sent.iter().filter(|(t, _)| t == ORDERS_PLACED_TOPIC).count();
        let dropped = sent.iter().filter(|(t, _)| t == TICKETS_CANCELLED_TOPIC).count();
        assert_eq!(placed, 2);
        assert_eq!(dropped, 2);
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected_before_reserving() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 2, 2).await;
        let allocator = allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new()));

        let requests = [
            TicketRequest::new(flight_id, seat("1A")).with_price(i64::MAX),
            TicketRequest::new(flight_id, seat("1B")).with_price(1),
        ];
        match allocator.place_order("mallory", &requests).await {
            Err(AllocationError::Validation(msg)) => assert!(msg.starts_with("tickets[1]")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 0);

        let order = allocator
            .place_order("alice", &[TicketRequest::new(flight_id, seat("1A")).with_price(i64::MAX)])
            .await
            .unwrap();
        assert_eq!(order.total_price_cents, i64::MAX);
    }

    /// Delegates to an in-memory store but fails whole-order cancellation
    struct BrokenCancelStore {
        inner: InMemoryOrderStore,
    }

    #[async_trait]
    impl OrderStore for BrokenCancelStore {
        async fn persist_order(&self, order: &Order, reservations: &[Reservation]) -> Result<(), StoreError> {
            self.inner.persist_order(order, reservations).await
        }
        async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(id).await
        }
        async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders(user_id).await
        }
        async fn cancel_ticket(&self, id: Uuid) -> Result<Ticket, StoreError> {
            self.inner.cancel_ticket(id).await
        }
        async fn cancel_order(&self, _id: Uuid) -> Result<Vec<Ticket>, StoreError> {
            Err(StoreError::Database("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_order_cancellation_changes_nothing() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 2, 2).await;
        let events = Arc::new(RecordingPublisher::default());
        let store = Arc::new(BrokenCancelStore { inner: InMemoryOrderStore::new() });
        let allocator = allocator(ledger.clone(), store).with_events(events.clone());

        let order = allocator
            .place_order(
                "alice",
                &[
                    TicketRequest::new(flight_id, seat("1A")),
                    TicketRequest::new(flight_id, seat("1B")),
                ],
            )
            .await
            .unwrap();

        assert!(matches!(
            allocator.cancel_order(order.id).await,
            Err(AllocationError::Storage(_))
        ));

        let stored = allocator.get_order(order.id).await.unwrap();
        assert_eq!(stored.active_tickets().count(), 2);
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 2);
        let sent = events.sent.lock().unwrap();
        assert!(sent.iter().all(|(topic, _)| topic != TICKETS_CANCELLED_TOPIC));
    }

    #[tokio::test]
    async fn test_cancel_order_skips_tickets_already_cancelled() {
        let ledger = Arc::new(InMemoryCapacityLedger::new());
        let flight_id = flight(&ledger, 2, 2).await;
        let events = Arc::new(RecordingPublisher::default());
        let allocator =
            allocator(ledger.clone(), Arc::new(InMemoryOrderStore::new())).with_events(events.clone());

        let order = allocator
            .place_order(
                "alice",
                &[
                    TicketRequest::new(flight_id, seat("1A")),
                    TicketRequest::new(flight_id, seat("1B")),
                ],
            )
            .await
            .unwrap();
        allocator.cancel_ticket(order.tickets[0].id).await.unwrap();

        let cancelled = allocator.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.active_tickets().count(), 0);
        assert_eq!(ledger.occupancy(flight_id).await.unwrap().held(), 0);

        let sent = events.sent.lock().unwrap();
        assert_eq!(sent.iter().filter(|(t, _)| t == TICKETS_CANCELLED_TOPIC).count(), 2);
    }
}
