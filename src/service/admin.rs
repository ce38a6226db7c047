//! Administrative actions on bags and goods.

use std::sync::Arc;

use axum::extract::FromRef;
use serde::Serialize;

use crate::AppState;
use crate::domain::qr::ScanTarget;
use crate::domain::store::{Goods, MAX_STOCK};
use crate::domain::{BagId, DomainError};
use crate::error::{Result, ServerError};
use crate::repository::{DeleteScope, GarbageRepository, StoreRepository};

/// Most bags created in one call.
pub const MAX_BATCH: u32 = 1000;

/// A freshly created bag with the payload to print on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintedBag {
    pub id: BagId,
    pub payload: String,
}

#[derive(Clone)]
pub struct AdminService {
    garbage: Arc<dyn GarbageRepository>,
    store: Arc<dyn StoreRepository>,
}

impl FromRef<AppState> for AdminService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            garbage: Arc::clone(&state.garbage),
            store: Arc::clone(&state.store),
        }
    }
}

impl AdminService {
    /// Create `count` unused bags.
    pub async fn create_bags(&self, count: u32) -> Result<Vec<PrintedBag>> {
        if count == 0 || count > MAX_BATCH {
            return Err(DomainError::InvalidQuantity.into());
        }

        let bags = self
            .garbage
            .create(count)
            .await?
            .into_iter()
            .map(|id| PrintedBag {
                id,
                payload: ScanTarget::Bag(id).to_string(),
            })
            .collect::<Vec<_>>();

        tracing::info!(count, "garbage bags created");
        Ok(bags)
    }

    /// Delete bag `id` if its state is covered by `scope`.
    pub async fn delete_bag(&self, id: BagId, scope: DeleteScope) -> Result<()> {
        if self.garbage.delete(id, scope).await? {
            tracing::info!(bag_id = %id, ?scope, "garbage bag deleted");
            return Ok(());
        }

        // Tell a missing bag apart from one in the wrong state.
        match self.garbage.find_by_id(id).await? {
            None => Err(ServerError::NotFound("garbage bag")),
            Some(bag) if bag.is_checked() => Err(DomainError::BagAlreadyChecked(id).into()),
            Some(bag) if bag.is_used() => Err(DomainError::BagAlreadyUsed(id).into()),
            Some(_) => Err(DomainError::BagNotUsed(id).into()),
        }
    }

    /// Delete every bag covered by `scope`.
    pub async fn delete_bags(&self, scope: DeleteScope) -> Result<u64> {
        let deleted = self.garbage.delete_all(scope).await?;
        tracing::info!(deleted, ?scope, "garbage bags deleted");
        Ok(deleted)
    }

    /// Add goods, or update the price and add stock of existing ones.
    pub async fn upsert_goods(&self, name: &str, score: i64, quantity: i32) -> Result<Goods> {
        if score < 0 || quantity < 0 {
            return Err(DomainError::InvalidQuantity.into());
        }
        if quantity > MAX_STOCK {
            return Err(DomainError::StockOverflow {
                stock: 0,
                added: quantity,
                max: MAX_STOCK,
            }
            .into());
        }

        let goods = self.store.upsert_goods(name.trim(), score, quantity).await?;
        tracing::info!(goods_id = goods.id, %name, score, stock = goods.quantity, "goods stocked");
        Ok(goods)
    }
}
