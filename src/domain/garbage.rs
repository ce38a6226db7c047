//! Garbage bag lifecycle.
//!
//! ```text
//! Unused --mark_used--> PendingCheck --mark_checked--> Checked
//! ```
//!
//! Each transition happens at most once. The state enum only carries the
//! fields reached so far, so a bag can never expose a verdict before it was
//! used.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::error::{DomainError, Result};
use crate::domain::id::{BagId, UserId};

/// Persisted lifecycle flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BagStatus {
    Unused = 0,
    PendingCheck = 1,
    Checked = 2,
}

impl BagStatus {
    pub fn flag(self) -> i16 {
        self as i16
    }
}

/// Data recorded when a normal user disposes of a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposal {
    pub category: Category,
    pub used_at: DateTime<Utc>,
    pub owner: UserId,
    pub location: String,
}

/// Data recorded when a manager verifies a disposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_correct: bool,
    pub checker: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BagState {
    Unused,
    PendingCheck {
        #[serde(flatten)]
        disposal: Disposal,
    },
    Checked {
        #[serde(flatten)]
        disposal: Disposal,
        #[serde(flatten)]
        verdict: Verdict,
    },
}

impl BagState {
    pub fn status(&self) -> BagStatus {
        match self {
            Self::Unused => BagStatus::Unused,
            Self::PendingCheck { .. } => BagStatus::PendingCheck,
            Self::Checked { .. } => BagStatus::Checked,
        }
    }

    pub fn disposal(&self) -> Option<&Disposal> {
        match self {
            Self::Unused => None,
            Self::PendingCheck { disposal } | Self::Checked { disposal, .. } => {
                Some(disposal)
            },
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Checked { verdict, .. } => Some(verdict),
            _ => None,
        }
    }
}

/// One physical garbage bag.
#[derive(Debug)]
pub struct GarbageBag {
    id: BagId,
    state: Mutex<BagState>,
}

impl GarbageBag {
    /// Create a new unused [`GarbageBag`].
    pub fn new(id: BagId) -> Self {
        Self::with_state(id, BagState::Unused)
    }

    /// Rebuild a [`GarbageBag`] loaded from storage.
    pub fn with_state(id: BagId, state: BagState) -> Self {
        Self {
            id,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> BagId {
        self.id
    }

    /// Copy of the current state.
    pub fn state(&self) -> BagState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> BagStatus {
        self.state.lock().status()
    }

    pub fn is_used(&self) -> bool {
        self.status() != BagStatus::Unused
    }

    pub fn is_checked(&self) -> bool {
        self.status() == BagStatus::Checked
    }

    /// User who disposed of this bag.
    pub fn owner(&self) -> Result<UserId> {
        self.state
            .lock()
            .disposal()
            .map(|d| d.owner.clone())
            .ok_or(DomainError::BagNotUsed(self.id))
    }

    /// Category declared on disposal.
    pub fn category(&self) -> Result<Category> {
        self.state
            .lock()
            .disposal()
            .map(|d| d.category)
            .ok_or(DomainError::BagNotUsed(self.id))
    }

    /// `Unused` to `PendingCheck`.
    pub fn mark_used(
        &self,
        category: Category,
        used_at: DateTime<Utc>,
        owner: UserId,
        location: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            BagState::Unused => {
                *state = BagState::PendingCheck {
                    disposal: Disposal {
                        category,
                        used_at,
                        owner,
                        location: location.into(),
                    },
                };
                Ok(())
            },
            BagState::PendingCheck { .. } => {
                Err(DomainError::BagAlreadyUsed(self.id))
            },
            BagState::Checked { .. } => {
                Err(DomainError::BagAlreadyChecked(self.id))
            },
        }
    }

    /// `PendingCheck` to `Checked`.
    pub fn mark_checked(&self, is_correct: bool, checker: UserId) -> Result<()> {
        let mut state = self.state.lock();
        let disposal = match &*state {
            BagState::PendingCheck { disposal } => disposal.clone(),
            BagState::Unused => return Err(DomainError::BagNotUsed(self.id)),
            BagState::Checked { .. } => {
                return Err(DomainError::BagAlreadyChecked(self.id));
            },
        };

        *state = BagState::Checked {
            disposal,
            verdict: Verdict {
                is_correct,
                checker,
            },
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(c: char) -> UserId {
        UserId::parse(c.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn test_mark_used_twice_is_rejected() {
        let bag = GarbageBag::new(BagId(1));
        let now = Utc::now();
        bag.mark_used(Category::Hazardous, now, uid('a'), "X").unwrap();
        let before = bag.state();

        assert_eq!(
            bag.mark_used(Category::Other, Utc::now(), uid('b'), "Y"),
            Err(DomainError::BagAlreadyUsed(BagId(1)))
        );
        assert_eq!(bag.state(), before);
        assert_eq!(bag.owner(), Ok(uid('a')));
        assert_eq!(bag.category(), Ok(Category::Hazardous));
    }

    #[test]
    fn test_check_requires_use() {
        let bag = GarbageBag::new(BagId(2));
        assert_eq!(
            bag.mark_checked(true, uid('e')),
            Err(DomainError::BagNotUsed(BagId(2)))
        );
        assert_eq!(bag.status(), BagStatus::Unused);
    }

    #[test]
    fn test_check_exactly_once() {
        let bag = GarbageBag::new(BagId(3));
        bag.mark_used(Category::Kitchen, Utc::now(), uid('a'), "hall")
            .unwrap();
        assert!(bag.is_used());
        assert!(!bag.is_checked());

        bag.mark_checked(false, uid('e')).unwrap();
        assert!(bag.is_checked());
        assert_eq!(
            bag.mark_checked(true, uid('f')),
            Err(DomainError::BagAlreadyChecked(BagId(3)))
        );
        assert_eq!(
            bag.state().verdict(),
            Some(&Verdict {
                is_correct: false,
                checker: uid('e')
            })
        );
        assert_eq!(
            bag.mark_used(Category::Other, Utc::now(), uid('b'), "X"),
            Err(DomainError::BagAlreadyChecked(BagId(3)))
        );
    }

    #[test]
    fn test_reads_before_use() {
        let bag = GarbageBag::new(BagId(4));
        assert!(!bag.is_used());
        assert_eq!(bag.owner(), Err(DomainError::BagNotUsed(BagId(4))));
        assert_eq!(bag.category(), Err(DomainError::BagNotUsed(BagId(4))));
    }

    #[test]
    fn test_concurrent_disposals_single_winner() {
        use std::sync::Arc;

        let bag = Arc::new(GarbageBag::new(BagId(5)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bag = Arc::clone(&bag);
                std::thread::spawn(move || {
                    let owner = uid(char::from_digit(i, 10).unwrap());
                    bag.mark_used(Category::Other, Utc::now(), owner, "X")
                        .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
