//! Core records and rules: users, garbage bags, reputation, store.

pub mod category;
pub mod error;
pub mod garbage;
pub mod id;
pub mod policy;
pub mod qr;
pub mod reputation;
pub mod session;
pub mod store;
pub mod user;

pub use category::Category;
pub use error::DomainError;
pub use garbage::{BagState, BagStatus, GarbageBag};
pub use id::{BagId, UserId};
pub use policy::DisposalPolicy;
pub use user::{Actor, Role, Standing, User};
