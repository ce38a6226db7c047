//! Persistence ports.
//!
//! Services only talk to storage through these traits. Writes that carry a
//! lifecycle transition are conditional on the stored state, so concurrent
//! stations racing on one record get a domain conflict instead of a lost
//! update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::store::{Goods, Order, Purchase};
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{BagId, BagStatus, DisposalPolicy, GarbageBag, Role, User, UserId};
use crate::error::Result;

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant, moved by hand.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(parking_lot::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(parking_lot::Mutex::new(now))
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.0.lock() += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

/// Which bags an administrative deletion may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteScope {
    /// Never used bags only.
    #[default]
    Unused,
    /// Unused or waiting for a check.
    Unchecked,
    /// Checked bags only.
    Checked,
    /// Any bag.
    All,
}

impl DeleteScope {
    pub fn allows(self, status: BagStatus) -> bool {
        match self {
            Self::Unused => status == BagStatus::Unused,
            Self::Unchecked => status != BagStatus::Checked,
            Self::Checked => status == BagStatus::Checked,
            Self::All => true,
        }
    }

    /// Lifecycle flags covered by this scope.
    pub fn flags(self) -> Vec<i16> {
        [BagStatus::Unused, BagStatus::PendingCheck, BagStatus::Checked]
            .into_iter()
            .filter(|status| self.allows(*status))
            .map(BagStatus::flag)
            .collect()
    }
}

/// Row of the public ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub id: UserId,
    pub name: String,
    pub score: i64,
    pub reputation: i32,
}

/// Port for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, failing if the identifier already exists.
    async fn insert(&self, user: &User) -> Result<()>;

    /// Find a user. Normal users carry their rolling disposal count for the
    /// window starting at `since`.
    async fn find_by_id(
        &self,
        id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<User>>;

    /// Normal users ordered by reputation then score.
    async fn ranking(&self, limit: u32) -> Result<Vec<RankEntry>>;

    /// Count users holding `role`.
    async fn count(&self, role: Role) -> Result<u64>;

    /// Delete a user that no disposal record references.
    async fn delete(&self, id: &UserId) -> Result<()>;
}

/// Port for garbage bag persistence.
#[async_trait]
pub trait GarbageRepository: Send + Sync {
    /// Create `count` unused bags.
    async fn create(&self, count: u32) -> Result<Vec<BagId>>;

    async fn find_by_id(&self, id: BagId) -> Result<Option<GarbageBag>>;

    /// Bags waiting for a manager, oldest first.
    async fn pending(&self, limit: u32) -> Result<Vec<GarbageBag>>;

    /// Store a disposal: the bag must still be unused in storage and the
    /// stored disposals of the owner inside the policy window ending at the
    /// disposal time must not exceed the weekly limit. The user's score is
    /// moved by the outcome's penalty.
    async fn commit_disposal(
        &self,
        bag: &GarbageBag,
        outcome: &ThrowOutcome,
        policy: &DisposalPolicy,
    ) -> Result<()>;

    /// Store a verification: the bag must still be pending in storage. The
    /// owner's score and reputation are moved by the outcome's deltas.
    async fn commit_check(
        &self,
        bag: &GarbageBag,
        outcome: &CheckOutcome,
    ) -> Result<()>;

    /// Delete one bag if its state matches `scope`. Returns whether a row was
    /// removed.
    async fn delete(&self, id: BagId, scope: DeleteScope) -> Result<bool>;

    /// Delete every bag matching `scope`.
    async fn delete_all(&self, scope: DeleteScope) -> Result<u64>;
}

/// Port for the reward store.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn list_goods(&self) -> Result<Vec<Goods>>;

    async fn find_goods(&self, id: i64) -> Result<Option<Goods>>;

    /// Insert goods, or update price and add stock when the name exists.
    async fn upsert_goods(&self, name: &str, score: i64, quantity: i32) -> Result<Goods>;

    /// Debit buyer, take stock and append to the buyer's open order, all in
    /// one transaction. Returns the order id.
    async fn commit_purchase(&self, purchase: &Purchase) -> Result<i64>;

    async fn find_order(&self, id: i64) -> Result<Option<Order>>;

    /// Move the buyer's open order to awaiting pickup.
    async fn checkout(&self, buyer: &UserId) -> Result<Option<Order>>;

    /// Move an order awaiting pickup to completed.
    async fn complete(&self, id: i64) -> Result<bool>;
}
