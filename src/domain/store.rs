//! Reward store: goods, orders and the purchase transition.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::id::UserId;
use crate::domain::user::{Standing, User};

/// Largest stock a single goods entry may hold.
pub const MAX_STOCK: i32 = 1_000_000;

/// Item redeemable with score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goods {
    pub id: i64,
    pub name: String,
    /// Unit price in score.
    pub score: i64,
    /// Units in stock.
    pub quantity: i32,
}

impl Goods {
    /// Add `quantity` units to the stock, bounded by [`MAX_STOCK`].
    pub fn restock(&mut self, quantity: i32) -> Result<()> {
        if quantity < 0 {
            return Err(DomainError::InvalidQuantity);
        }

        self.quantity = self
            .quantity
            .checked_add(quantity)
            .filter(|stock| *stock <= MAX_STOCK)
            .ok_or(DomainError::StockOverflow {
                stock: self.quantity,
                added: quantity,
                max: MAX_STOCK,
            })?;
        Ok(())
    }

    /// Check that `quantity` units can be taken from stock.
    pub fn ensure_available(&self, quantity: i32) -> Result<()> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if quantity > self.quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.quantity,
            });
        }
        Ok(())
    }

    /// Score owed for `quantity` units.
    pub fn cost(&self, quantity: i32) -> i64 {
        self.score.saturating_mul(i64::from(quantity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open = 0,
    AwaitingPickup = 1,
    Completed = 2,
}

impl OrderStatus {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::AwaitingPickup),
            2 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub goods_id: i64,
    pub quantity: i32,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub buyer: UserId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
}

/// A validated purchase, ready to be committed.
///
/// The in-memory buyer has already been debited; the repository repeats the
/// balance and stock guards inside its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub buyer: UserId,
    pub goods_id: i64,
    pub quantity: i32,
    pub cost: i64,
    pub standing: Standing,
}

impl Purchase {
    /// Validate stock, role and balance, then debit the buyer.
    pub fn prepare(buyer: &User, goods: &Goods, quantity: i32) -> Result<Self> {
        goods.ensure_available(quantity)?;
        let cost = goods.cost(quantity);
        let standing = buyer.spend(cost)?;

        Ok(Self {
            buyer: buyer.id().clone(),
            goods_id: goods.id,
            quantity,
            cost,
            standing,
        })
    }
}
