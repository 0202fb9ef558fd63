use airlane_core::ledger::Reservation;
use airlane_core::repository::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Order, Ticket};

/// Durable record of committed orders and tickets.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the order and all of its tickets in one transaction, consuming
    /// the ledger reservations that back them. Nothing is written on error.
    async fn persist_order(&self, order: &Order, reservations: &[Reservation]) -> Result<(), StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first
    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, StoreError>;

    /// Mark an active ticket cancelled and return it. Fails with
    /// [`StoreError::Conflict`] if it was already cancelled.
    async fn cancel_ticket(&self, id: Uuid) -> Result<Ticket, StoreError>;

    /// Cancel every active ticket of an order in one transaction and return
    /// them. Fails with [`StoreError::Conflict`] if none were active.
    async fn cancel_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError>;
}

/// Order store kept in process memory
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ticket across all orders
    pub async fn tickets(&self) -> Vec<Ticket> {
        self.orders
            .read()
            .await
            .values()
            .flat_map(|o| o.tickets.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn persist_order(&self, order: &Order, _reservations: &[Reservation]) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn cancel_ticket(&self, id: Uuid) -> Result<Ticket, StoreError> {
        let mut orders = self.orders.write().await;
        let ticket = orders
            .values_mut()
            .flat_map(|o| o.tickets.iter_mut())
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {}", id)))?;

        if !ticket.is_active() {
            return Err(StoreError::Conflict(format!("ticket {} already cancelled", id)));
        }

        ticket.cancel();
        Ok(ticket.clone())
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        let mut cancelled = Vec::new();
        for ticket in order.tickets.iter_mut().filter(|t| t.is_active()) {
            ticket.cancel();
            cancelled.push(ticket.clone());
        }

        if cancelled.is_empty() {
            return Err(StoreError::Conflict(format!("order {} has no active tickets", order_id)));
        }
        Ok(cancelled)
    }
}
