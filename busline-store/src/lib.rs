pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod events;
pub mod fleet_repo;
pub mod memory;
pub mod redis_repo;
pub mod reservation_repo;
mod rows;

pub use booking_repo::PgBookingRepository;
pub use catalog_repo::PgCatalogRepository;
pub use database::DbClient;
pub use events::{EventProducer, LogPublisher};
pub use fleet_repo::PgFleetRepository;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationRepository;
