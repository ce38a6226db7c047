//! Disposal and verification of garbage bags.
//!
//! Each call loads fresh records, runs the domain transition on them and
//! commits through the garbage port. The commit is conditional on the stored
//! lifecycle flag, so a station working on a stale copy gets the domain
//! conflict back.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::AppState;
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{BagId, Category, DisposalPolicy, GarbageBag, User, UserId};
use crate::error::{Result, ServerError};
use crate::repository::{Clock, GarbageRepository, UserRepository};
use crate::telemetry;

#[derive(Clone)]
pub struct DisposalService {
    users: Arc<dyn UserRepository>,
    garbage: Arc<dyn GarbageRepository>,
    clock: Arc<dyn Clock>,
    policy: DisposalPolicy,
}

impl FromRef<AppState> for DisposalService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: Arc::clone(&state.users),
            garbage: Arc::clone(&state.garbage),
            clock: Arc::clone(&state.clock),
            policy: state.config.policy,
        }
    }
}

impl DisposalService {
    async fn user(&self, id: &UserId) -> Result<User> {
        let since = self.policy.window_start(self.clock.now());
        self.users
            .find_by_id(id, since)
            .await?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Load one bag.
    pub async fn bag(&self, id: BagId) -> Result<GarbageBag> {
        self.garbage
            .find_by_id(id)
            .await?
            .ok_or(ServerError::NotFound("garbage bag"))
    }

    /// Bags waiting for a manager, oldest first.
    pub async fn pending(&self, limit: u32) -> Result<Vec<GarbageBag>> {
        self.garbage.pending(limit).await
    }

    /// `user_id` disposes of bag `bag_id` as `category` at `location`.
    pub async fn throw(
        &self,
        user_id: &UserId,
        bag_id: BagId,
        category: Category,
        location: &str,
    ) -> Result<ThrowOutcome> {
        let now = self.clock.now();
        let user = self.user(user_id).await?;
        let bag = self.bag(bag_id).await?;

        let outcome = user
            .throw_rubbish(&bag, category, location, now, &self.policy)
            .inspect_err(|err| {
                tracing::debug!(%user_id, %bag_id, error = %err, "disposal rejected")
            })?;
        self.garbage
            .commit_disposal(&bag, &outcome, &self.policy)
            .await?;

        telemetry::record_disposal(category);
        tracing::info!(
            %user_id,
            %bag_id,
            %category,
            penalty = outcome.penalty,
            rolling_count = outcome.standing.rolling_count,
            "garbage disposed"
        );

        Ok(outcome)
    }

    /// Manager `checker_id` verifies bag `bag_id`.
    pub async fn check(
        &self,
        checker_id: &UserId,
        bag_id: BagId,
        is_correct: bool,
    ) -> Result<CheckOutcome> {
        let checker = self.user(checker_id).await?;
        let bag = self.bag(bag_id).await?;
        let owner = self.user(&bag.owner()?).await?;

        let outcome = checker
            .check_rubbish(&bag, is_correct, &owner, &self.policy)
            .inspect_err(|err| {
                tracing::debug!(%checker_id, %bag_id, error = %err, "check rejected")
            })?;
        self.garbage.commit_check(&bag, &outcome).await?;

        telemetry::record_check(is_correct);
        tracing::info!(
            %checker_id,
            %bag_id,
            owner_id = %outcome.owner,
            is_correct,
            score_delta = outcome.score_delta,
            reputation_delta = outcome.reputation_delta,
            "garbage checked"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::{BagStatus, DomainError, Role, Standing};
    use crate::{seed_user, test_state};

    #[tokio::test]
    async fn test_dispose_then_check() {
        let (state, _) = test_state();
        let service = DisposalService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing {
            score: 10,
            ..Standing::default()
        })
        .await;
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let bag = state.garbage.create(1).await.unwrap()[0];

        let thrown = service.throw(&alice, bag, Category::Hazardous, "X").await.unwrap();
        assert_eq!(thrown.penalty, 0);
        assert_eq!(thrown.standing.rolling_count, 1);

        let stored = service.bag(bag).await.unwrap();
        assert_eq!(stored.status(), BagStatus::PendingCheck);
        assert_eq!(stored.owner().unwrap(), alice);
        assert_eq!(service.pending(10).await.unwrap().len(), 1);

        let checked = service.check(&manager, bag, true).await.unwrap();
        assert_eq!(checked.score_delta, 2);
        assert!(checked.reputation_delta > 0);

        let stored = service.bag(bag).await.unwrap();
        let verdict = stored.state().verdict().cloned().unwrap();
        assert!(verdict.is_correct);
        assert_eq!(verdict.checker, manager);

        let alice = service.user(&alice).await.unwrap();
        assert_eq!(alice.standing().unwrap().score, 12);
        assert!(service.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manager_cannot_throw() {
        let (state, _) = test_state();
        let service = DisposalService::from_ref(&state);
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let bag = state.garbage.create(1).await.unwrap()[0];

        let err = service
            .throw(&manager, bag, Category::Other, "X")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Domain(DomainError::RoleNotSupported { .. })
        ));
        assert_eq!(service.bag(bag).await.unwrap().status(), BagStatus::Unused);
    }

    #[tokio::test]
    async fn test_double_disposal_conflicts() {
        let (state, _) = test_state();
        let service = DisposalService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing::default()).await;
        let bob = seed_user(&state, "bob", Role::Normal, Standing::default()).await;
        let bag = state.garbage.create(1).await.unwrap()[0];

        service.throw(&alice, bag, Category::Kitchen, "X").await.unwrap();
        let err = service.throw(&bob, bag, Category::Kitchen, "Y").await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Domain(DomainError::BagAlreadyUsed(_))
        ));
        assert_eq!(service.bag(bag).await.unwrap().owner().unwrap(), alice);
    }

    #[tokio::test]
    async fn test_weekly_limit_and_window() {
        let (state, clock) = test_state();
        let service = DisposalService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing {
            score: 100,
            ..Standing::default()
        })
        .await;
        let limit = state.config.policy.weekly_limit;
        let bags = state.garbage.create(limit + 3).await.unwrap();

        // Counts 0..=limit are accepted, past the ceiling with a penalty.
        for bag in &bags[..=limit as usize] {
            service.throw(&alice, *bag, Category::Other, "X").await.unwrap();
        }
        let user = service.user(&alice).await.unwrap();
        let ceiling = state.config.policy.weekly_ceiling;
        let penalised = i64::from(limit - ceiling);
        assert_eq!(user.standing().unwrap().score, 100 - 3 * penalised);

        let refused = bags[limit as usize + 1];
        let err = service
            .throw(&alice, refused, Category::Other, "X")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Domain(DomainError::DisposalLimitReached { .. })
        ));
        assert_eq!(service.bag(refused).await.unwrap().status(), BagStatus::Unused);

        // Once the window has moved past every disposal, throwing works again.
        clock.advance(Duration::days(8));
        service.throw(&alice, refused, Category::Other, "X").await.unwrap();
    }

    #[tokio::test]
    async fn test_check_requires_manager() {
        let (state, _) = test_state();
        let service = DisposalService::from_ref(&state);
        let alice = seed_user(&state, "alice", Role::Normal, Standing::default()).await;
        let bag = state.garbage.create(1).await.unwrap()[0];
        service.throw(&alice, bag, Category::Recyclable, "X").await.unwrap();

        let err = service.check(&alice, bag, true).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Domain(DomainError::RoleNotSupported { .. })
        ));
        assert_eq!(service.bag(bag).await.unwrap().status(), BagStatus::PendingCheck);
    }

    #[tokio::test]
    async fn test_check_unused_bag() {
        let (state, _) = test_state();
        let service = DisposalService::from_ref(&state);
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let bag = state.garbage.create(1).await.unwrap()[0];

        let err = service.check(&manager, bag, true).await.unwrap_err();
        assert!(matches!(err, ServerError::Domain(DomainError::BagNotUsed(_))));
        assert!(matches!(
            service.check(&manager, BagId(999), true).await,
            Err(ServerError::NotFound(_))
        ));
    }
}
