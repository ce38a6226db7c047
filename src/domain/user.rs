//! User domain entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::error::{DomainError, Result};
use crate::domain::garbage::GarbageBag;
use crate::domain::id::{BagId, UserId};
use crate::domain::policy::{
    DisposalPolicy, OVER_CEILING_PENALTY, WRONG_SORTING_PENALTY,
};
use crate::domain::reputation::{self, DEFAULT_REPUTATION, MAX_REPUTATION, MIN_REPUTATION};

/// Role given at creation, never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Normal,
    Manager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Self::Normal),
            "manager" => Ok(Self::Manager),
            other => Err(DomainError::InvalidRole(other.to_owned())),
        }
    }
}

/// Score, reputation and recent usage of a normal user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub score: i64,
    pub reputation: i32,
    pub rolling_count: u32,
}

impl Default for Standing {
    fn default() -> Self {
        Self {
            score: 0,
            reputation: DEFAULT_REPUTATION,
            rolling_count: 0,
        }
    }
}

impl Standing {
    /// Check an initial standing supplied on creation.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.score < 0 || !(MIN_REPUTATION..=MAX_REPUTATION).contains(&self.reputation) {
            return Err(DomainError::InvalidStanding {
                score: self.score,
                reputation: self.reputation,
            });
        }
        Ok(())
    }
}

/// Lightweight identity of whoever performs an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

/// Result of a successful disposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowOutcome {
    pub bag: BagId,
    pub category: Category,
    /// Score removed because the weekly ceiling was exceeded.
    pub penalty: i64,
    pub standing: Standing,
}

/// Result of a successful verification, seen from the owner's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub bag: BagId,
    pub owner: UserId,
    pub is_correct: bool,
    pub score_delta: i64,
    pub reputation_delta: i32,
    pub standing: Standing,
}

#[derive(Debug)]
enum Kind {
    Normal(Mutex<Standing>),
    Manager,
}

/// A person interacting with the system.
#[derive(Debug)]
pub struct User {
    id: UserId,
    name: String,
    kind: Kind,
}

impl User {
    /// Create a normal [`User`].
    pub fn normal(id: UserId, name: impl Into<String>, standing: Standing) -> Self {
        Self {
            id,
            name: name.into(),
            kind: Kind::Normal(Mutex::new(standing)),
        }
    }

    /// Create a manager [`User`].
    pub fn manager(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: Kind::Manager,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        match self.kind {
            Kind::Normal(_) => Role::Normal,
            Kind::Manager => Role::Manager,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role(),
        }
    }

    fn account(&self, action: &'static str) -> Result<&Mutex<Standing>> {
        match &self.kind {
            Kind::Normal(standing) => Ok(standing),
            Kind::Manager => Err(DomainError::RoleNotSupported {
                role: Role::Manager,
                action,
            }),
        }
    }

    fn require_manager(&self, action: &'static str) -> Result<()> {
        match self.kind {
            Kind::Manager => Ok(()),
            Kind::Normal(_) => Err(DomainError::RoleNotSupported {
                role: Role::Normal,
                action,
            }),
        }
    }

    /// Copy of the current standing. Managers have none.
    pub fn standing(&self) -> Result<Standing> {
        Ok(*self.account("hold a score balance")?.lock())
    }

    /// Dispose of `bag` as `category`.
    ///
    /// Refused above the weekly limit. Above the weekly ceiling the disposal
    /// is accepted with a score penalty. A bag conflict leaves the user
    /// untouched.
    pub fn throw_rubbish(
        &self,
        bag: &GarbageBag,
        category: Category,
        location: &str,
        at: DateTime<Utc>,
        policy: &DisposalPolicy,
    ) -> Result<ThrowOutcome> {
        let mut standing = self.account("throw rubbish")?.lock();

        if policy.is_refused(standing.rolling_count) {
            return Err(DomainError::DisposalLimitReached {
                count: standing.rolling_count,
                limit: policy.weekly_limit,
            });
        }

        bag.mark_used(category, at, self.id.clone(), location)?;

        let penalty = if policy.is_over_ceiling(standing.rolling_count) {
            let before = standing.score;
            standing.score = (standing.score - OVER_CEILING_PENALTY).max(0);
            before - standing.score
        } else {
            0
        };
        standing.rolling_count += 1;

        Ok(ThrowOutcome {
            bag: bag.id(),
            category,
            penalty,
            standing: *standing,
        })
    }

    /// Verify a pending disposal made by `owner`.
    ///
    /// Every precondition is checked before the bag transitions, so either
    /// the bag and the owner are both updated or neither is.
    pub fn check_rubbish(
        &self,
        bag: &GarbageBag,
        is_correct: bool,
        owner: &User,
        policy: &DisposalPolicy,
    ) -> Result<CheckOutcome> {
        self.require_manager("check rubbish")?;
        let account = owner.account("own rubbish")?;

        let recorded = bag.owner()?;
        if recorded != owner.id {
            return Err(DomainError::OwnerMismatch {
                bag: bag.id(),
                user: owner.id.clone(),
            });
        }
        let category = bag.category()?;

        bag.mark_checked(is_correct, self.id.clone())?;

        let mut standing = account.lock();
        let before = *standing;

        standing.reputation = reputation::evaluate(
            standing.reputation,
            is_correct,
            standing.rolling_count,
            policy.weekly_ceiling,
        );
        standing.score = if is_correct {
            standing.score + category.reward()
        } else {
            (standing.score - WRONG_SORTING_PENALTY).max(0)
        };

        Ok(CheckOutcome {
            bag: bag.id(),
            owner: owner.id.clone(),
            is_correct,
            score_delta: standing.score - before.score,
            reputation_delta: standing.reputation - before.reputation,
            standing: *standing,
        })
    }

    /// Remove `cost` from the score balance.
    pub fn spend(&self, cost: i64) -> Result<Standing> {
        let mut standing = self.account("buy goods")?.lock();
        if standing.score < cost {
            return Err(DomainError::InsufficientScore {
                required: cost,
                available: standing.score,
            });
        }

        standing.score -= cost;
        Ok(*standing)
    }
}
