pub mod airport_repo;
pub mod app_config;
pub mod database;
pub mod events;
pub mod ledger_repo;
pub mod order_repo;
pub mod redis_repo;

pub use airport_repo::{PgAirportRepository, PgRouteRepository};
pub use database::DbClient;
pub use events::EventProducer;
pub use ledger_repo::PgCapacityLedger;
pub use order_repo::PgOrderStore;
pub use redis_repo::RedisClient;
