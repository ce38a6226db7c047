//! Use cases: load records, apply the domain transition, commit.

pub mod account;
pub mod admin;
pub mod disposal;
pub mod store;

pub use account::AccountService;
pub use admin::AdminService;
pub use disposal::DisposalService;
pub use store::StoreService;

/// Page size of list endpoints.
pub const DEFAULT_LIMIT: u32 = 50;
