//! Reward store: buying goods with score, checkout and pickup.

use std::sync::Arc;

use axum::extract::FromRef;
use serde::Serialize;

use crate::AppState;
use crate::domain::store::{Goods, Order, Purchase};
use crate::domain::{DisposalPolicy, DomainError, Role, Standing, User, UserId};
use crate::error::{Result, ServerError};
use crate::repository::{Clock, StoreRepository, UserRepository};
use crate::telemetry;
use crate::token::{Purpose, TokenManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub order_id: i64,
    pub goods_id: i64,
    pub quantity: i32,
    pub cost: i64,
    pub standing: Standing,
}

/// An order ready to be collected, with the token proving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub order: Order,
    pub token: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct StoreService {
    users: Arc<dyn UserRepository>,
    store: Arc<dyn StoreRepository>,
    token: TokenManager,
    clock: Arc<dyn Clock>,
    policy: DisposalPolicy,
}

impl FromRef<AppState> for StoreService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: Arc::clone(&state.users),
            store: Arc::clone(&state.store),
            token: state.token.clone(),
            clock: Arc::clone(&state.clock),
            policy: state.config.policy,
        }
    }
}

impl StoreService {
    async fn user(&self, id: &UserId) -> Result<User> {
        let since = self.policy.window_start(self.clock.now());
        self.users
            .find_by_id(id, since)
            .await?
            .ok_or(ServerError::NotFound("user"))
    }

    pub async fn goods(&self) -> Result<Vec<Goods>> {
        self.store.list_goods().await
    }

    /// `buyer_id` buys `quantity` units of `goods_id`.
    pub async fn purchase(
        &self,
        buyer_id: &UserId,
        goods_id: i64,
        quantity: i32,
    ) -> Result<Receipt> {
        let buyer = self.user(buyer_id).await?;
        let goods = self
            .store
            .find_goods(goods_id)
            .await?
            .ok_or(ServerError::NotFound("goods"))?;

        let purchase = Purchase::prepare(&buyer, &goods, quantity)?;
        let order_id = self.store.commit_purchase(&purchase).await?;

        telemetry::record_purchase(quantity);
        tracing::info!(
            %buyer_id,
            goods_id,
            quantity,
            cost = purchase.cost,
            order_id,
            "goods purchased"
        );

        Ok(Receipt {
            order_id,
            goods_id,
            quantity,
            cost: purchase.cost,
            standing: purchase.standing,
        })
    }

    /// Close the buyer's open order and issue its pickup token.
    pub async fn checkout(&self, buyer_id: &UserId) -> Result<Checkout> {
        let order = self
            .store
            .checkout(buyer_id)
            .await?
            .ok_or(ServerError::NotFound("open order"))?;

        let token = self.token.create_order(buyer_id, order.id, self.clock.now())?;
        tracing::info!(%buyer_id, order_id = order.id, "order awaiting pickup");

        Ok(Checkout {
            order,
            token,
            expires_in: self.token.order_ttl().num_seconds(),
        })
    }

    /// Manager `manager_id` hands out the order proven by `token`.
    pub async fn pickup(&self, manager_id: &UserId, token: &str) -> Result<Order> {
        let manager = self.user(manager_id).await?;
        if manager.role() != Role::Manager {
            return Err(DomainError::RoleNotSupported {
                role: manager.role(),
                action: "hand out orders",
            }
            .into());
        }

        let claims = self.token.decode(token, Purpose::Order)?;
        let order_id = claims.order.ok_or(ServerError::Unauthorized)?;

        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(ServerError::NotFound("order"))?;
        if order.buyer.as_str() != claims.sub {
            return Err(ServerError::Unauthorized);
        }

        if !self.store.complete(order_id).await? {
            return Err(ServerError::NotFound("order awaiting pickup"));
        }

        tracing::info!(%manager_id, order_id, buyer_id = %order.buyer, "order picked up");
        self.store
            .find_order(order_id)
            .await?
            .ok_or(ServerError::NotFound("order"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::OrderStatus;
    use crate::service::AdminService;
    use crate::{seed_user, test_state};

    #[tokio::test]
    async fn test_purchase_checkout_pickup() {
        let (state, _) = test_state();
        let store = StoreService::from_ref(&state);
        let admin = AdminService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing {
            score: 50,
            ..Standing::default()
        })
        .await;
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let goods = admin.upsert_goods("bottle", 20, 3).await.unwrap();

        let receipt = store.purchase(&alice, goods.id, 2).await.unwrap();
        assert_eq!(receipt.cost, 40);
        assert_eq!(receipt.standing.score, 10);

        let checkout = store.checkout(&alice).await.unwrap();
        assert_eq!(checkout.order.id, receipt.order_id);
        assert_eq!(checkout.order.status, OrderStatus::AwaitingPickup);

        // Normal users cannot hand out orders.
        assert!(matches!(
            store.pickup(&alice, &checkout.token).await,
            Err(ServerError::Domain(DomainError::RoleNotSupported { .. }))
        ));

        let order = store.pickup(&manager, &checkout.token).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(store.pickup(&manager, &checkout.token).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_purchase_changes_nothing() {
        let (state, _) = test_state();
        let store = StoreService::from_ref(&state);
        let admin = AdminService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing {
            score: 30,
            ..Standing::default()
        })
        .await;
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let goods = admin.upsert_goods("bottle", 20, 3).await.unwrap();

        assert!(matches!(
            store.purchase(&alice, goods.id, 2).await,
            Err(ServerError::Domain(DomainError::InsufficientScore { .. }))
        ));
        assert!(matches!(
            store.purchase(&alice, goods.id, 4).await,
            Err(ServerError::Domain(DomainError::InsufficientStock { .. }))
        ));
        assert!(matches!(
            store.purchase(&alice, goods.id, 0).await,
            Err(ServerError::Domain(DomainError::InvalidQuantity))
        ));
        assert!(matches!(
            store.purchase(&manager, goods.id, 1).await,
            Err(ServerError::Domain(DomainError::RoleNotSupported { .. }))
        ));

        let user = store.user(&alice).await.unwrap();
        assert_eq!(user.standing().unwrap().score, 30);
        assert_eq!(store.goods().await.unwrap()[0].quantity, 3);
        assert!(matches!(
            store.checkout(&alice).await,
            Err(ServerError::NotFound(_))
        ));
    }
}
