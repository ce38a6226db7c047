//! PostgreSQL implementation for user repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgQueryResult;

use super::models::{RankRecord, UserRecord};
use crate::domain::{Role, User, UserId};
use crate::error::{Result, ServerError};
use crate::repository::{RankEntry, UserRepository};

/// PostgreSQL user repository.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &User) -> Result<()> {
        let standing = user.standing().unwrap_or_default();

        let result: PgQueryResult = sqlx::query(
            r#"
            INSERT INTO users (uid, name, role, score, reputation)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(user.id().as_str())
        .bind(user.name())
        .bind(user.role().as_str())
        .bind(standing.score)
        .bind(standing.reputation)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::UserExists);
        }

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT
                u.uid, u.name, u.role, u.score, u.reputation,
                (
                    SELECT COUNT(*) FROM garbage g
                    WHERE g.user_id = u.uid AND g.used_at >= $2
                ) AS rolling_count
            FROM users u
            WHERE u.uid = $1
            "#,
        )
        .bind(id.as_str())
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        record.map(UserRecord::try_into_user).transpose()
    }

    async fn ranking(&self, limit: u32) -> Result<Vec<RankEntry>> {
        let records = sqlx::query_as::<_, RankRecord>(
            r#"
            SELECT uid, name, score, reputation
            FROM users
            WHERE role = 'normal'
            ORDER BY reputation DESC, score DESC, uid
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(RankRecord::try_into_entry).collect()
    }

    async fn count(&self, role: Role) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn delete(&self, id: &UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM garbage WHERE user_id = $1 OR checker_id = $1)
                OR EXISTS (SELECT 1 FROM orders WHERE user_id = $1)
            "#,
        )
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if referenced {
            return Err(ServerError::UserReferenced(id.clone()));
        }

        let result: PgQueryResult = sqlx::query("DELETE FROM users WHERE uid = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("user"));
        }

        tx.commit().await?;
        Ok(())
    }
}
