pub mod allocator;
pub mod models;
pub mod store;

pub use allocator::{AllocationError, OrderAllocator};
pub use models::{Order, Ticket, TicketRequest, TicketStatus};
pub use store::{InMemoryOrderStore, OrderStore};
