//! Database models for PostgreSQL.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::garbage::{BagState, Disposal, Verdict};
use crate::domain::store::{Goods, Order, OrderLine, OrderStatus};
use crate::domain::{BagId, Category, GarbageBag, Role, Standing, User, UserId};
use crate::error::{Result, ServerError};
use crate::repository::RankEntry;

/// User record, joined with its rolling disposal count.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub role: String,
    pub score: i64,
    pub reputation: i32,
    pub rolling_count: i64,
}

impl UserRecord {
    /// Convert to [`User`].
    pub fn try_into_user(self) -> Result<User> {
        let id = UserId::parse(&self.uid)?;
        let user = match self.role.parse::<Role>()? {
            Role::Manager => User::manager(id, self.name),
            Role::Normal => User::normal(
                id,
                self.name,
                Standing {
                    score: self.score,
                    reputation: self.reputation,
                    rolling_count: u32::try_from(self.rolling_count)
                        .unwrap_or(u32::MAX),
                },
            ),
        };
        Ok(user)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RankRecord {
    pub uid: String,
    pub name: String,
    pub score: i64,
    pub reputation: i32,
}

impl RankRecord {
    pub fn try_into_entry(self) -> Result<RankEntry> {
        Ok(RankEntry {
            id: UserId::parse(&self.uid)?,
            name: self.name,
            score: self.score,
            reputation: self.reputation,
        })
    }
}

/// Garbage bag record. Columns past the stored flag are NULL.
#[derive(Debug, Clone, FromRow)]
pub struct GarbageRecord {
    pub gid: i64,
    pub flag: i16,
    pub category: Option<i16>,
    pub used_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub location: Option<String>,
    pub is_correct: Option<bool>,
    pub checker_id: Option<String>,
}

impl GarbageRecord {
    fn corrupted(&self) -> ServerError {
        ServerError::Internal {
            details: format!("garbage row {} does not match its flag {}", self.gid, self.flag),
            source: None,
        }
    }

    fn disposal(&self) -> Result<Disposal> {
        match (self.category, self.used_at, &self.user_id) {
            (Some(category), Some(used_at), Some(owner)) => Ok(Disposal {
                category: Category::from_code(category)?,
                used_at,
                owner: UserId::parse(owner)?,
                location: self.location.clone().unwrap_or_default(),
            }),
            _ => Err(self.corrupted()),
        }
    }

    /// Convert to [`GarbageBag`].
    pub fn try_into_bag(self) -> Result<GarbageBag> {
        let state = match self.flag {
            0 => BagState::Unused,
            1 => BagState::PendingCheck {
                disposal: self.disposal()?,
            },
            2 => {
                let disposal = self.disposal()?;
                let (Some(is_correct), Some(checker)) = (self.is_correct, &self.checker_id)
                else {
                    return Err(self.corrupted());
                };
                BagState::Checked {
                    disposal,
                    verdict: Verdict {
                        is_correct,
                        checker: UserId::parse(checker)?,
                    },
                }
            },
            _ => return Err(self.corrupted()),
        };

        Ok(GarbageBag::with_state(BagId(self.gid), state))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GoodsRecord {
    pub id: i64,
    pub name: String,
    pub score: i64,
    pub quantity: i32,
}

impl From<GoodsRecord> for Goods {
    fn from(record: GoodsRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            score: record.score,
            quantity: record.quantity,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub user_id: String,
    pub status: i16,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderLineRecord {
    pub goods_id: i64,
    pub quantity: i32,
    pub score: i64,
}

impl OrderRecord {
    /// Convert to [`Order`] with its line items.
    pub fn try_into_order(self, lines: Vec<OrderLineRecord>) -> Result<Order> {
        let status = OrderStatus::from_code(self.status).ok_or_else(|| {
            ServerError::Internal {
                details: format!("order {} has unknown status {}", self.id, self.status),
                source: None,
            }
        })?;

        Ok(Order {
            id: self.id,
            buyer: UserId::parse(&self.user_id)?,
            status,
            lines: lines
                .into_iter()
                .map(|line| OrderLine {
                    goods_id: line.goods_id,
                    quantity: line.quantity,
                    score: line.score,
                })
                .collect(),
        })
    }
}
