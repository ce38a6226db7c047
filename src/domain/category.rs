//! Garbage categories.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// The four fixed sorting categories.
///
/// Numeric codes are persisted and printed on bins; they must never be
/// renumbered without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Recyclable = 1,
    Kitchen = 2,
    Hazardous = 3,
    Other = 4,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Recyclable,
        Category::Kitchen,
        Category::Hazardous,
        Category::Other,
    ];

    /// Decode a persisted category code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            1 => Ok(Self::Recyclable),
            2 => Ok(Self::Kitchen),
            3 => Ok(Self::Hazardous),
            4 => Ok(Self::Other),
            _ => Err(DomainError::InvalidCategory(code)),
        }
    }

    /// Persisted category code.
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Score earned by a correctly sorted disposal of this category.
    pub fn reward(self) -> i64 {
        match self {
            Self::Recyclable => 3,
            Self::Kitchen | Self::Hazardous => 2,
            Self::Other => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recyclable => "recyclable",
            Self::Kitchen => "kitchen",
            Self::Hazardous => "hazardous",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
