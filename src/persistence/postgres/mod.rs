//! PostgreSQL adapters.

mod garbage_repository;
mod models;
mod store_repository;
mod user_repository;

pub use garbage_repository::PgGarbageRepository;
pub use store_repository::PgStoreRepository;
pub use user_repository::PgUserRepository;
