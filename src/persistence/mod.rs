//! Storage adapters behind the repository ports.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
