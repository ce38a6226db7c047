//! In-memory store (does not persist across restarts).
//!
//! Implements every repository port over one lock, so multi-record commits
//! are atomic the same way the SQL transactions are.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::garbage::BagState;
use crate::domain::reputation::{MAX_REPUTATION, MIN_REPUTATION};
use crate::domain::store::{Goods, Order, OrderLine, OrderStatus, Purchase};
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{
    BagId, BagStatus, DisposalPolicy, DomainError, GarbageBag, Role, Standing, User, UserId,
};
use crate::error::{Result, ServerError};
use crate::repository::{
    DeleteScope, GarbageRepository, RankEntry, StoreRepository, UserRepository,
};

#[derive(Debug, Clone)]
struct UserRow {
    name: String,
    role: Role,
    score: i64,
    reputation: i32,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRow>,
    bags: BTreeMap<i64, BagState>,
    goods: BTreeMap<i64, Goods>,
    orders: BTreeMap<i64, Order>,
    next_bag: i64,
    next_goods: i64,
    next_order: i64,
}

impl Tables {
    fn rolling_count(&self, id: &UserId, since: DateTime<Utc>) -> u32 {
        let count = self
            .bags
            .values()
            .filter_map(BagState::disposal)
            .filter(|disposal| &disposal.owner == id && disposal.used_at >= since)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn conflict(&self, id: BagId) -> ServerError {
        match self.bags.get(&id.0).map(BagState::status) {
            None => ServerError::NotFound("garbage bag"),
            Some(BagStatus::Unused) => DomainError::BagNotUsed(id).into(),
            Some(BagStatus::PendingCheck) => DomainError::BagAlreadyUsed(id).into(),
            Some(BagStatus::Checked) => DomainError::BagAlreadyChecked(id).into(),
        }
    }

    fn normal_mut(&mut self, id: &UserId) -> Result<&mut UserRow> {
        self.users
            .get_mut(id)
            .filter(|row| row.role == Role::Normal)
            .ok_or(ServerError::NotFound("user"))
    }
}

/// In-memory implementation of the user, garbage and store ports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.users.contains_key(user.id()) {
            return Err(ServerError::UserExists);
        }

        let standing = user.standing().unwrap_or_default();
        tables.users.insert(
            user.id().clone(),
            UserRow {
                name: user.name().to_owned(),
                role: user.role(),
                score: standing.score,
                reputation: standing.reputation,
            },
        );
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let tables = self.tables.read();
        let Some(row) = tables.users.get(id) else {
            return Ok(None);
        };

        let user = match row.role {
            Role::Manager => User::manager(id.clone(), row.name.clone()),
            Role::Normal => User::normal(
                id.clone(),
                row.name.clone(),
                Standing {
                    score: row.score,
                    reputation: row.reputation,
                    rolling_count: tables.rolling_count(id, since),
                },
            ),
        };
        Ok(Some(user))
    }

    async fn ranking(&self, limit: u32) -> Result<Vec<RankEntry>> {
        let tables = self.tables.read();
        let mut entries: Vec<RankEntry> = tables
            .users
            .iter()
            .filter(|(_, row)| row.role == Role::Normal)
            .map(|(id, row)| RankEntry {
                id: id.clone(),
                name: row.name.clone(),
                score: row.score,
                reputation: row.reputation,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.reputation
                .cmp(&a.reputation)
                .then(b.score.cmp(&a.score))
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn count(&self, role: Role) -> Result<u64> {
        let tables = self.tables.read();
        Ok(tables.users.values().filter(|row| row.role == role).count() as u64)
    }

    async fn delete(&self, id: &UserId) -> Result<()> {
        let mut tables = self.tables.write();

        let referenced = tables.bags.values().any(|state| {
            state.disposal().is_some_and(|d| &d.owner == id)
                || state.verdict().is_some_and(|v| &v.checker == id)
        }) || tables.orders.values().any(|order| &order.buyer == id);
        if referenced {
            return Err(ServerError::UserReferenced(id.clone()));
        }

        tables
            .users
            .remove(id)
            .map(|_| ())
            .ok_or(ServerError::NotFound("user"))
    }
}

#[async_trait]
impl GarbageRepository for MemoryStore {
    async fn create(&self, count: u32) -> Result<Vec<BagId>> {
        let mut tables = self.tables.write();
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            tables.next_bag += 1;
            let id = tables.next_bag;
            tables.bags.insert(id, BagState::Unused);
            ids.push(BagId(id));
        }
        Ok(ids)
    }

    async fn find_by_id(&self, id: BagId) -> Result<Option<GarbageBag>> {
        let tables = self.tables.read();
        Ok(tables
            .bags
            .get(&id.0)
            .map(|state| GarbageBag::with_state(id, state.clone())))
    }

    async fn pending(&self, limit: u32) -> Result<Vec<GarbageBag>> {
        let tables = self.tables.read();
        let mut pending: Vec<(DateTime<Utc>, GarbageBag)> = tables
            .bags
            .iter()
            .filter_map(|(id, state)| match state {
                BagState::PendingCheck { disposal } => Some((
                    disposal.used_at,
                    GarbageBag::with_state(BagId(*id), state.clone()),
                )),
                _ => None,
            })
            .collect();

        pending.sort_by(|(a, bag_a), (b, bag_b)| a.cmp(b).then(bag_a.id().cmp(&bag_b.id())));
        Ok(pending
            .into_iter()
            .take(limit as usize)
            .map(|(_, bag)| bag)
            .collect())
    }

    async fn commit_disposal(
        &self,
        bag: &GarbageBag,
        outcome: &ThrowOutcome,
        policy: &DisposalPolicy,
    ) -> Result<()> {
        let state = bag.state();
        let BagState::PendingCheck { disposal } = &state else {
            return Err(DomainError::BagNotUsed(bag.id()).into());
        };

        let mut tables = self.tables.write();
        if tables.bags.get(&bag.id().0) != Some(&BagState::Unused) {
            return Err(tables.conflict(bag.id()));
        }

        let count = tables.rolling_count(&disposal.owner, policy.window_start(disposal.used_at));
        if policy.is_refused(count) {
            return Err(DomainError::DisposalLimitReached {
                count,
                limit: policy.weekly_limit,
            }
            .into());
        }

        let row = tables.normal_mut(&disposal.owner)?;
        row.score = (row.score - outcome.penalty).max(0);
        tables.bags.insert(bag.id().0, state);
        Ok(())
    }

    async fn commit_check(
        &self,
        bag: &GarbageBag,
        outcome: &CheckOutcome,
    ) -> Result<()> {
        let state = bag.state();
        if state.status() != BagStatus::Checked {
            return Err(DomainError::BagNotUsed(bag.id()).into());
        }

        let mut tables = self.tables.write();
        if tables.bags.get(&bag.id().0).map(BagState::status) != Some(BagStatus::PendingCheck) {
            return Err(tables.conflict(bag.id()));
        }

        let row = tables.normal_mut(&outcome.owner)?;
        row.score = (row.score + outcome.score_delta).max(0);
        row.reputation = (row.reputation + outcome.reputation_delta)
            .clamp(MIN_REPUTATION, MAX_REPUTATION);
        tables.bags.insert(bag.id().0, state);
        Ok(())
    }

    async fn delete(&self, id: BagId, scope: DeleteScope) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.bags.get(&id.0) {
            Some(state) if scope.allows(state.status()) => {
                tables.bags.remove(&id.0);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn delete_all(&self, scope: DeleteScope) -> Result<u64> {
        let mut tables = self.tables.write();
        let before = tables.bags.len();
        tables.bags.retain(|_, state| !scope.allows(state.status()));
        Ok((before - tables.bags.len()) as u64)
    }
}

#[async_trait]
impl StoreRepository for MemoryStore {
    async fn list_goods(&self) -> Result<Vec<Goods>> {
        Ok(self.tables.read().goods.values().cloned().collect())
    }

    async fn find_goods(&self, id: i64) -> Result<Option<Goods>> {
        Ok(self.tables.read().goods.get(&id).cloned())
    }

    async fn upsert_goods(&self, name: &str, score: i64, quantity: i32) -> Result<Goods> {
        let mut tables = self.tables.write();
        if let Some(goods) = tables.goods.values_mut().find(|goods| goods.name == name) {
            goods.restock(quantity)?;
            goods.score = score;
            return Ok(goods.clone());
        }

        let mut goods = Goods {
            id: tables.next_goods + 1,
            name: name.to_owned(),
            score,
            quantity: 0,
        };
        goods.restock(quantity)?;
        tables.next_goods = goods.id;
        tables.goods.insert(goods.id, goods.clone());
        Ok(goods)
    }

    async fn commit_purchase(&self, purchase: &Purchase) -> Result<i64> {
        let mut tables = self.tables.write();

        // Check every guard before writing anything.
        let available = tables.normal_mut(&purchase.buyer)?.score;
        if available < purchase.cost {
            return Err(DomainError::InsufficientScore {
                required: purchase.cost,
                available,
            }
            .into());
        }
        let stock = tables
            .goods
            .get(&purchase.goods_id)
            .map(|goods| goods.quantity)
            .ok_or(ServerError::NotFound("goods"))?;
        if stock < purchase.quantity {
            return Err(DomainError::InsufficientStock {
                requested: purchase.quantity,
                available: stock,
            }
            .into());
        }

        tables.normal_mut(&purchase.buyer)?.score -= purchase.cost;
        if let Some(goods) = tables.goods.get_mut(&purchase.goods_id) {
            goods.quantity -= purchase.quantity;
        }

        let open = tables
            .orders
            .values()
            .find(|order| order.buyer == purchase.buyer && order.status == OrderStatus::Open)
            .map(|order| order.id);
        let order_id = match open {
            Some(id) => id,
            None => {
                tables.next_order += 1;
                let id = tables.next_order;
                tables.orders.insert(
                    id,
                    Order {
                        id,
                        buyer: purchase.buyer.clone(),
                        status: OrderStatus::Open,
                        lines: Vec::new(),
                    },
                );
                id
            },
        };

        if let Some(order) = tables.orders.get_mut(&order_id) {
            match order
                .lines
                .iter_mut()
                .find(|line| line.goods_id == purchase.goods_id)
            {
                Some(line) => {
                    line.quantity += purchase.quantity;
                    line.score += purchase.cost;
                },
                None => {
                    order.lines.push(OrderLine {
                        goods_id: purchase.goods_id,
                        quantity: purchase.quantity,
                        score: purchase.cost,
                    });
                    order.lines.sort_by_key(|line| line.goods_id);
                },
            }
        }

        Ok(order_id)
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>> {
        Ok(self.tables.read().orders.get(&id).cloned())
    }

    async fn checkout(&self, buyer: &UserId) -> Result<Option<Order>> {
        let mut tables = self.tables.write();
        Ok(tables
            .orders
            .values_mut()
            .find(|order| &order.buyer == buyer && order.status == OrderStatus::Open)
            .map(|order| {
                order.status = OrderStatus::AwaitingPickup;
                order.clone()
            }))
    }

    async fn complete(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::AwaitingPickup => {
                order.status = OrderStatus::Completed;
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::store::MAX_STOCK;
    use crate::domain::Category;

    fn uid(c: char) -> UserId {
        UserId::parse(c.to_string().repeat(64)).unwrap()
    }

    #[tokio::test]
    async fn test_stale_disposal_is_rejected() {
        let store = MemoryStore::new();
        let policy = DisposalPolicy::default();
        let now = Utc::now();
        store.insert(&User::normal(uid('a'), "alice", Standing::default())).await.unwrap();
        store.insert(&User::normal(uid('b'), "bob", Standing::default())).await.unwrap();
        let id = store.create(1).await.unwrap()[0];

        // Two stations load the same unused bag.
        let first = GarbageRepository::find_by_id(&store, id).await.unwrap().unwrap();
        let second = GarbageRepository::find_by_id(&store, id).await.unwrap().unwrap();

        let alice = UserRepository::find_by_id(&store, &uid('a'), now).await.unwrap().unwrap();
        let bob = UserRepository::find_by_id(&store, &uid('b'), now).await.unwrap().unwrap();

        let outcome = alice
            .throw_rubbish(&first, Category::Kitchen, "A", now, &policy)
            .unwrap();
        store.commit_disposal(&first, &outcome, &policy).await.unwrap();

        let outcome = bob
            .throw_rubbish(&second, Category::Other, "B", now, &policy)
            .unwrap();
        let err = store.commit_disposal(&second, &outcome, &policy).await.unwrap_err();
        assert!(matches!(err, ServerError::Domain(DomainError::BagAlreadyUsed(_))));

        let stored = GarbageRepository::find_by_id(&store, id).await.unwrap().unwrap();
        assert_eq!(stored.owner().unwrap(), uid('a'));
    }

    #[tokio::test]
    async fn test_limit_is_checked_on_commit() {
        let store = MemoryStore::new();
        let policy = DisposalPolicy {
            weekly_ceiling: 0,
            weekly_limit: 1,
            window_days: 7,
        };
        let now = Utc::now();
        store.insert(&User::normal(uid('a'), "alice", Standing::default())).await.unwrap();
        let ids = store.create(3).await.unwrap();

        let alice = UserRepository::find_by_id(&store, &uid('a'), now).await.unwrap().unwrap();
        let bag = GarbageRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let outcome = alice.throw_rubbish(&bag, Category::Other, "A", now, &policy).unwrap();
        store.commit_disposal(&bag, &outcome, &policy).await.unwrap();

        // Two stations load alice at the limit, which is still allowed.
        let since = policy.window_start(now);
        let first = UserRepository::find_by_id(&store, &uid('a'), since).await.unwrap().unwrap();
        let second = UserRepository::find_by_id(&store, &uid('a'), since).await.unwrap().unwrap();
        assert_eq!(first.standing().unwrap().rolling_count, 1);

        let bag = GarbageRepository::find_by_id(&store, ids[1]).await.unwrap().unwrap();
        let outcome = first.throw_rubbish(&bag, Category::Other, "A", now, &policy).unwrap();
        store.commit_disposal(&bag, &outcome, &policy).await.unwrap();

        let bag = GarbageRepository::find_by_id(&store, ids[2]).await.unwrap().unwrap();
        let outcome = second.throw_rubbish(&bag, Category::Other, "B", now, &policy).unwrap();
        assert!(matches!(
            store.commit_disposal(&bag, &outcome, &policy).await,
            Err(ServerError::Domain(DomainError::DisposalLimitReached { count: 2, limit: 1 }))
        ));

        let stored = GarbageRepository::find_by_id(&store, ids[2]).await.unwrap().unwrap();
        assert_eq!(stored.status(), BagStatus::Unused);
    }

    #[tokio::test]
    async fn test_rolling_count_window() {
        let store = MemoryStore::new();
        let policy = DisposalPolicy::default();
        let now = Utc::now();
        store.insert(&User::normal(uid('a'), "alice", Standing::default())).await.unwrap();

        for (id, days_ago) in store.create(3).await.unwrap().into_iter().zip([10, 3, 0]) {
            let user = UserRepository::find_by_id(&store, &uid('a'), now).await.unwrap().unwrap();
            let bag = GarbageRepository::find_by_id(&store, id).await.unwrap().unwrap();
            let at = now - Duration::days(days_ago);
            let outcome = user
                .throw_rubbish(&bag, Category::Recyclable, "A", at, &policy)
                .unwrap();
            store.commit_disposal(&bag, &outcome, &policy).await.unwrap();
        }

        let user = UserRepository::find_by_id(&store, &uid('a'), policy.window_start(now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.standing().unwrap().rolling_count, 2);
    }

    #[tokio::test]
    async fn test_delete_referenced_user() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert(&User::normal(uid('a'), "alice", Standing::default())).await.unwrap();
        store.insert(&User::normal(uid('c'), "carol", Standing::default())).await.unwrap();
        let ids = store.create(1).await.unwrap();

        let alice = UserRepository::find_by_id(&store, &uid('a'), now).await.unwrap().unwrap();
        let bag = GarbageRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let outcome = alice
            .throw_rubbish(&bag, Category::Other, "A", now, &DisposalPolicy::default())
            .unwrap();
        store.commit_disposal(&bag, &outcome, &DisposalPolicy::default()).await.unwrap();

        assert!(matches!(
            UserRepository::delete(&store, &uid('a')).await,
            Err(ServerError::UserReferenced(_))
        ));
        UserRepository::delete(&store, &uid('c')).await.unwrap();
        assert!(matches!(
            UserRepository::delete(&store, &uid('c')).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_scope() {
        let store = MemoryStore::new();
        store.insert(&User::normal(uid('a'), "alice", Standing::default())).await.unwrap();
        let ids = store.create(3).await.unwrap();

        let alice = UserRepository::find_by_id(&store, &uid('a'), Utc::now()).await.unwrap().unwrap();
        let bag = GarbageRepository::find_by_id(&store, ids[0]).await.unwrap().unwrap();
        let outcome = alice
            .throw_rubbish(&bag, Category::Other, "A", Utc::now(), &DisposalPolicy::default())
            .unwrap();
        store.commit_disposal(&bag, &outcome, &DisposalPolicy::default()).await.unwrap();

        assert!(!GarbageRepository::delete(&store, ids[0], DeleteScope::Unused).await.unwrap());
        assert!(GarbageRepository::delete(&store, ids[1], DeleteScope::Unused).await.unwrap());
        assert_eq!(store.delete_all(DeleteScope::Unchecked).await.unwrap(), 2);
        assert!(GarbageRepository::find_by_id(&store, ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purchase_merges_open_order() {
        let store = MemoryStore::new();
        let buyer = User::normal(
            uid('a'),
            "alice",
            Standing {
                score: 100,
                ..Standing::default()
            },
        );
        store.insert(&buyer).await.unwrap();
        let goods = store.upsert_goods("pen", 10, 5).await.unwrap();

        for _ in 0..2 {
            let buyer = UserRepository::find_by_id(&store, &uid('a'), Utc::now())
                .await
                .unwrap()
                .unwrap();
            let goods = store.find_goods(goods.id).await.unwrap().unwrap();
            let purchase = Purchase::prepare(&buyer, &goods, 2).unwrap();
            store.commit_purchase(&purchase).await.unwrap();
        }

        let order = store.checkout(&uid('a')).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingPickup);
        assert_eq!(
            order.lines,
            vec![OrderLine {
                goods_id: goods.id,
                quantity: 4,
                score: 40
            }]
        );
        assert_eq!(store.find_goods(goods.id).await.unwrap().unwrap().quantity, 1);
        assert!(store.checkout(&uid('a')).await.unwrap().is_none());
        assert!(store.complete(order.id).await.unwrap());
        assert!(!store.complete(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_goods_restocks() {
        let store = MemoryStore::new();
        let first = store.upsert_goods("bag", 5, 3).await.unwrap();
        let second = store.upsert_goods("bag", 6, 2).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.score, 6);
        assert_eq!(second.quantity, 5);
        assert_eq!(store.list_goods().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restock_overflow_is_rejected() {
        let store = MemoryStore::new();
        let pen = store.upsert_goods("pen", 1, MAX_STOCK).await.unwrap();

        assert!(matches!(
            store.upsert_goods("pen", 2, 1).await,
            Err(ServerError::Domain(DomainError::StockOverflow { stock: MAX_STOCK, added: 1, .. }))
        ));
        assert!(matches!(
            store.upsert_goods("pen", 2, i32::MAX).await,
            Err(ServerError::Domain(DomainError::StockOverflow { .. }))
        ));
        // Neither the stock nor the price moved.
        assert_eq!(store.find_goods(pen.id).await.unwrap().unwrap(), pen);

        assert!(store.upsert_goods("ink", 1, i32::MAX).await.is_err());
        assert_eq!(store.list_goods().await.unwrap().len(), 1);
    }
}
