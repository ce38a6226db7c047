//! PostgreSQL implementation for garbage repository.
//!
//! Lifecycle writes are guarded by the stored flag and run in the same
//! transaction as the matching user update. A disposal also re-counts the
//! owner's stored disposals under a lock on the user row, so stations
//! holding a stale count cannot both pass the weekly limit.

use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::GarbageRecord;
use crate::domain::garbage::BagState;
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{BagId, DisposalPolicy, DomainError, GarbageBag};
use crate::error::{Result, ServerError};
use crate::repository::{DeleteScope, GarbageRepository};

/// PostgreSQL garbage repository.
pub struct PgGarbageRepository {
    pool: PgPool,
}

impl PgGarbageRepository {
    /// Create a new [`PgGarbageRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Explain why a guarded update on `id` matched no row.
async fn conflict(tx: &mut Transaction<'_, Postgres>, id: BagId) -> Result<ServerError> {
    let flag: Option<i16> = sqlx::query_scalar("SELECT flag FROM garbage WHERE gid = $1")
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(match flag {
        None => ServerError::NotFound("garbage bag"),
        Some(0) => DomainError::BagNotUsed(id).into(),
        Some(1) => DomainError::BagAlreadyUsed(id).into(),
        Some(_) => DomainError::BagAlreadyChecked(id).into(),
    })
}

/// Move a user's score and reputation, keeping both in range.
async fn apply_standing(
    tx: &mut Transaction<'_, Postgres>,
    uid: &str,
    score_delta: i64,
    reputation_delta: i32,
) -> Result<()> {
    let result: PgQueryResult = sqlx::query(
        r#"
        UPDATE users
        SET
            score = GREATEST(score + $2, 0),
            reputation = LEAST(GREATEST(reputation + $3, 5), 1000)
        WHERE uid = $1 AND role = 'normal'
        "#,
    )
    .bind(uid)
    .bind(score_delta)
    .bind(reputation_delta)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServerError::NotFound("user"));
    }
    Ok(())
}

#[async_trait]
impl GarbageRepository for PgGarbageRepository {
    async fn create(&self, count: u32) -> Result<Vec<BagId>> {
        let mut ids: Vec<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO garbage (flag)
            SELECT 0 FROM generate_series(1, $1::BIGINT)
            RETURNING gid
            "#,
        )
        .bind(i64::from(count))
        .fetch_all(&self.pool)
        .await?;

        ids.sort_unstable();
        Ok(ids.into_iter().map(BagId).collect())
    }

    async fn find_by_id(&self, id: BagId) -> Result<Option<GarbageBag>> {
        let record = sqlx::query_as::<_, GarbageRecord>(
            r#"
            SELECT gid, flag, category, used_at, user_id, location, is_correct, checker_id
            FROM garbage
            WHERE gid = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        record.map(GarbageRecord::try_into_bag).transpose()
    }

    async fn pending(&self, limit: u32) -> Result<Vec<GarbageBag>> {
        let records = sqlx::query_as::<_, GarbageRecord>(
            r#"
            SELECT gid, flag, category, used_at, user_id, location, is_correct, checker_id
            FROM garbage
            WHERE flag = 1
            ORDER BY used_at, gid
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(GarbageRecord::try_into_bag).collect()
    }

    async fn commit_disposal(
        &self,
        bag: &GarbageBag,
        outcome: &ThrowOutcome,
        policy: &DisposalPolicy,
    ) -> Result<()> {
        let BagState::PendingCheck { disposal } = bag.state() else {
            return Err(DomainError::BagNotUsed(bag.id()).into());
        };

        let mut tx = self.pool.begin().await?;

        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE garbage
            SET flag = 1, category = $2, used_at = $3, user_id = $4, location = $5
            WHERE gid = $1 AND flag = 0
            "#,
        )
        .bind(bag.id().0)
        .bind(disposal.category.code())
        .bind(disposal.used_at)
        .bind(disposal.owner.as_str())
        .bind(&disposal.location)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(conflict(&mut tx, bag.id()).await?);
        }

        // Disposals of one user commit one at a time past this lock.
        sqlx::query("SELECT uid FROM users WHERE uid = $1 FOR UPDATE")
            .bind(disposal.owner.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let stored: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM garbage WHERE user_id = $1 AND used_at >= $2 AND gid <> $3",
        )
        .bind(disposal.owner.as_str())
        .bind(policy.window_start(disposal.used_at))
        .bind(bag.id().0)
        .fetch_one(&mut *tx)
        .await?;

        let count = u32::try_from(stored).unwrap_or(u32::MAX);
        if policy.is_refused(count) {
            return Err(DomainError::DisposalLimitReached {
                count,
                limit: policy.weekly_limit,
            }
            .into());
        }

        apply_standing(&mut tx, disposal.owner.as_str(), -outcome.penalty, 0).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_check(
        &self,
        bag: &GarbageBag,
        outcome: &CheckOutcome,
    ) -> Result<()> {
        let BagState::Checked { verdict, .. } = bag.state() else {
            return Err(DomainError::BagNotUsed(bag.id()).into());
        };

        let mut tx = self.pool.begin().await?;

        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE garbage
            SET flag = 2, is_correct = $2, checker_id = $3
            WHERE gid = $1 AND flag = 1
            "#,
        )
        .bind(bag.id().0)
        .bind(verdict.is_correct)
        .bind(verdict.checker.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(conflict(&mut tx, bag.id()).await?);
        }

        apply_standing(
            &mut tx,
            outcome.owner.as_str(),
            outcome.score_delta,
            outcome.reputation_delta,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: BagId, scope: DeleteScope) -> Result<bool> {
        let result: PgQueryResult =
            sqlx::query("DELETE FROM garbage WHERE gid = $1 AND flag = ANY($2)")
                .bind(id.0)
                .bind(scope.flags())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, scope: DeleteScope) -> Result<u64> {
        let result: PgQueryResult =
            sqlx::query("DELETE FROM garbage WHERE flag = ANY($1)")
                .bind(scope.flags())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
