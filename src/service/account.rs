//! Accounts: login, lookup, creation and removal of users.

use std::sync::Arc;

use axum::extract::FromRef;
use serde::Serialize;

use crate::AppState;
use crate::crypto::{Credentials, IdentityHasher};
use crate::domain::{Actor, DisposalPolicy, Role, Standing, User, UserId};
use crate::error::{Result, ServerError};
use crate::repository::{Clock, RankEntry, UserRepository};

/// Returned once when a user is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedUser {
    #[serde(flatten)]
    pub actor: Actor,
    /// Present when the credentials were generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standing: Option<Standing>,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Self {
            actor: user.actor(),
            standing: user.standing().ok(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<IdentityHasher>,
    clock: Arc<dyn Clock>,
    policy: DisposalPolicy,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: Arc::clone(&state.users),
            hasher: Arc::clone(&state.hasher),
            clock: Arc::clone(&state.clock),
            policy: state.config.policy,
        }
    }
}

impl AccountService {
    /// Load a user with its rolling disposal count.
    pub async fn find(&self, id: &UserId) -> Result<User> {
        let since = self.policy.window_start(self.clock.now());
        self.users
            .find_by_id(id, since)
            .await?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Recompute the identifier of `name` + `secret` and load it.
    pub async fn authenticate(&self, name: &str, secret: &str) -> Result<User> {
        let id = self.hasher.make_uid(name, secret);
        match self.find(&id).await {
            Err(ServerError::NotFound(_)) => {
                tracing::debug!(%name, "login with unknown credentials");
                Err(ServerError::Unauthorized)
            },
            res => res,
        }
    }

    /// Create a user. Without credentials a random pair is generated and
    /// returned.
    pub async fn create(
        &self,
        role: Role,
        credentials: Option<Credentials>,
        standing: Option<Standing>,
    ) -> Result<CreatedUser> {
        if let Some(standing) = &standing {
            standing.ensure_valid()?;
        }

        let (credentials, generated) = match credentials {
            Some(credentials) => (credentials, false),
            None => (Credentials::random(role.as_str()), true),
        };

        let id = self.hasher.make_uid(&credentials.name, &credentials.secret);
        let user = match role {
            Role::Normal => User::normal(
                id,
                credentials.name.clone(),
                Standing {
                    rolling_count: 0,
                    ..standing.unwrap_or_default()
                },
            ),
            Role::Manager => User::manager(id, credentials.name.clone()),
        };

        self.users.insert(&user).await?;
        tracing::info!(user_id = %user.id(), %role, "user created");

        Ok(CreatedUser {
            actor: user.actor(),
            credentials: generated.then_some(credentials),
        })
    }

    /// Remove a user never referenced by disposals, checks or orders.
    pub async fn delete(&self, id: &UserId) -> Result<()> {
        self.users.delete(id).await?;
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn ranking(&self, limit: u32) -> Result<Vec<RankEntry>> {
        self.users.ranking(limit).await
    }

    pub async fn count(&self, role: Role) -> Result<u64> {
        self.users.count(role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::test_state;

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let (state, _) = test_state();
        let accounts = AccountService::from_ref(&state);

        let created = accounts
            .create(
                Role::Normal,
                Some(Credentials {
                    name: "alice".into(),
                    secret: "hunter2".into(),
                }),
                Some(Standing {
                    score: 40,
                    reputation: 500,
                    rolling_count: 9,
                }),
            )
            .await
            .unwrap();
        assert!(created.credentials.is_none());

        let user = accounts.authenticate("alice", "hunter2").await.unwrap();
        assert_eq!(user.id(), &created.actor.id);
        assert_eq!(
            user.standing().unwrap(),
            Standing {
                score: 40,
                reputation: 500,
                rolling_count: 0
            }
        );

        assert!(matches!(
            accounts.authenticate("alice", "wrong").await,
            Err(ServerError::Unauthorized)
        ));
        assert!(matches!(
            accounts
                .create(
                    Role::Manager,
                    Some(Credentials {
                        name: "alice".into(),
                        secret: "hunter2".into(),
                    }),
                    None,
                )
                .await,
            Err(ServerError::UserExists)
        ));
    }

    #[tokio::test]
    async fn test_random_credentials_are_returned() {
        let (state, _) = test_state();
        let accounts = AccountService::from_ref(&state);

        let created = accounts.create(Role::Manager, None, None).await.unwrap();
        let credentials = created.credentials.unwrap();
        assert!(credentials.name.starts_with("manager-"));

        let user = accounts
            .authenticate(&credentials.name, &credentials.secret)
            .await
            .unwrap();
        assert_eq!(user.role(), Role::Manager);
        assert_eq!(accounts.count(Role::Manager).await.unwrap(), 1);
        assert_eq!(accounts.count(Role::Normal).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_initial_standing_is_checked() {
        let (state, _) = test_state();
        let accounts = AccountService::from_ref(&state);

        for (score, reputation) in [(-1, 300), (0, 4), (0, 1001)] {
            let standing = Standing {
                score,
                reputation,
                rolling_count: 0,
            };
            assert!(matches!(
                accounts.create(Role::Normal, None, Some(standing)).await,
                Err(ServerError::Domain(DomainError::InvalidStanding { .. }))
            ));
        }
        assert_eq!(accounts.count(Role::Normal).await.unwrap(), 0);
    }
}
