//! Disposal rate policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Longest rolling window accepted from configuration.
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Score removed when a disposal exceeds the weekly ceiling.
pub const OVER_CEILING_PENALTY: i64 = 3;
/// Score removed for an incorrectly sorted disposal.
pub const WRONG_SORTING_PENALTY: i64 = 4;

/// Rate limits applied to normal users.
///
/// The rolling count is the number of disposals a user made during the last
/// `window_days` days, counted from the stored disposal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DisposalPolicy {
    /// Above this count disposals still succeed but cost
    /// [`OVER_CEILING_PENALTY`] and no longer raise reputation.
    pub weekly_ceiling: u32,
    /// Above this count disposals are refused.
    pub weekly_limit: u32,
    /// Length of the rolling window.
    #[validate(range(min = 1, max = MAX_WINDOW_DAYS))]
    pub window_days: u32,
}

impl Default for DisposalPolicy {
    fn default() -> Self {
        Self {
            weekly_ceiling: 34,
            weekly_limit: 50,
            window_days: 7,
        }
    }
}

impl DisposalPolicy {
    /// Start of the rolling window ending at `now`.
    /// Saturates at the earliest representable instant.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(i64::from(self.window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_refused(&self, rolling_count: u32) -> bool {
        rolling_count > self.weekly_limit
    }

    pub fn is_over_ceiling(&self, rolling_count: u32) -> bool {
        rolling_count > self.weekly_ceiling
    }
}
