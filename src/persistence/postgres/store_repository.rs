//! PostgreSQL implementation for the reward store.

use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{GoodsRecord, OrderLineRecord, OrderRecord};
use crate::domain::store::{Goods, MAX_STOCK, Order, OrderStatus, Purchase};
use crate::domain::{DomainError, UserId};
use crate::error::{Result, ServerError};
use crate::repository::StoreRepository;

/// PostgreSQL store repository.
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    /// Create a new [`PgStoreRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: OrderRecord,
    ) -> Result<Order> {
        let lines = sqlx::query_as::<_, OrderLineRecord>(
            r#"
            SELECT goods_id, quantity, score
            FROM order_items
            WHERE order_id = $1
            ORDER BY goods_id
            "#,
        )
        .bind(record.id)
        .fetch_all(&mut **tx)
        .await?;

        record.try_into_order(lines)
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn list_goods(&self) -> Result<Vec<Goods>> {
        let records = sqlx::query_as::<_, GoodsRecord>(
            "SELECT id, name, score, quantity FROM goods ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Goods::from).collect())
    }

    async fn find_goods(&self, id: i64) -> Result<Option<Goods>> {
        let record = sqlx::query_as::<_, GoodsRecord>(
            "SELECT id, name, score, quantity FROM goods WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Goods::from))
    }

    async fn upsert_goods(&self, name: &str, score: i64, quantity: i32) -> Result<Goods> {
        if !(0..=MAX_STOCK).contains(&quantity) {
            return Err(DomainError::StockOverflow {
                stock: 0,
                added: quantity,
                max: MAX_STOCK,
            }
            .into());
        }

        // Restocking past the bound updates nothing and returns no row.
        let record = sqlx::query_as::<_, GoodsRecord>(
            r#"
            INSERT INTO goods (name, score, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET score = EXCLUDED.score, quantity = goods.quantity + EXCLUDED.quantity
            WHERE goods.quantity::BIGINT + EXCLUDED.quantity <= $4
            RETURNING id, name, score, quantity
            "#,
        )
        .bind(name)
        .bind(score)
        .bind(quantity)
        .bind(i64::from(MAX_STOCK))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = record {
            return Ok(record.into());
        }

        let stock: i32 = sqlx::query_scalar("SELECT quantity FROM goods WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Err(DomainError::StockOverflow {
            stock,
            added: quantity,
            max: MAX_STOCK,
        }
        .into())
    }

    async fn commit_purchase(&self, purchase: &Purchase) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        // Debit buyer.
        let debited: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users SET score = score - $2
            WHERE uid = $1 AND role = 'normal' AND score >= $2
            RETURNING score
            "#,
        )
        .bind(purchase.buyer.as_str())
        .bind(purchase.cost)
        .fetch_optional(&mut *tx)
        .await?;

        if debited.is_none() {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT score FROM users WHERE uid = $1")
                    .bind(purchase.buyer.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match available {
                Some(available) => DomainError::InsufficientScore {
                    required: purchase.cost,
                    available,
                }
                .into(),
                None => ServerError::NotFound("user"),
            });
        }

        // Take stock.
        let result: PgQueryResult = sqlx::query(
            "UPDATE goods SET quantity = quantity - $2 WHERE id = $1 AND quantity >= $2",
        )
        .bind(purchase.goods_id)
        .bind(purchase.quantity)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let available: Option<i32> =
                sqlx::query_scalar("SELECT quantity FROM goods WHERE id = $1")
                    .bind(purchase.goods_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match available {
                Some(available) => DomainError::InsufficientStock {
                    requested: purchase.quantity,
                    available,
                }
                .into(),
                None => ServerError::NotFound("goods"),
            });
        }

        // Get or create the open order.
        let open: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE user_id = $1 AND status = $2 FOR UPDATE",
        )
        .bind(purchase.buyer.as_str())
        .bind(OrderStatus::Open.code())
        .fetch_optional(&mut *tx)
        .await?;

        let order_id = match open {
            Some(id) => id,
            None => {
                sqlx::query_scalar(
                    "INSERT INTO orders (user_id, status) VALUES ($1, $2) RETURNING id",
                )
                .bind(purchase.buyer.as_str())
                .bind(OrderStatus::Open.code())
                .fetch_one(&mut *tx)
                .await?
            },
        };

        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, goods_id, quantity, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, goods_id) DO UPDATE
            SET
                quantity = order_items.quantity + EXCLUDED.quantity,
                score = order_items.score + EXCLUDED.score
            "#,
        )
        .bind(order_id)
        .bind(purchase.goods_id)
        .bind(purchase.quantity)
        .bind(purchase.cost)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order_id)
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, OrderRecord>(
            "SELECT id, user_id, status FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let order = match record {
            Some(record) => Some(self.load_order(&mut tx, record).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(order)
    }

    async fn checkout(&self, buyer: &UserId) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, OrderRecord>(
            r#"
            UPDATE orders SET status = $3
            WHERE user_id = $1 AND status = $2
            RETURNING id, user_id, status
            "#,
        )
        .bind(buyer.as_str())
        .bind(OrderStatus::Open.code())
        .bind(OrderStatus::AwaitingPickup.code())
        .fetch_optional(&mut *tx)
        .await?;

        let order = match record {
            Some(record) => Some(self.load_order(&mut tx, record).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(order)
    }

    async fn complete(&self, id: i64) -> Result<bool> {
        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE orders SET status = $3, completed_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(OrderStatus::AwaitingPickup.code())
        .bind(OrderStatus::Completed.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
