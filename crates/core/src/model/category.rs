use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::scope::ScopeError;

/// Number of items in the basic-learning track.
pub const BASIC_LEARNING_CEILING: u32 = 789;

/// Insurance line a question belongs to.
///
/// The set is closed: persisted records naming any other category are foreign
/// data and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "lifeInsurance")]
    Life,
    #[serde(rename = "propertyInsurance")]
    Property,
    #[serde(rename = "casualtyInsurance")]
    Casualty,
    #[serde(rename = "healthInsurance")]
    Health,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 4] = [
        Category::Life,
        Category::Property,
        Category::Casualty,
        Category::Health,
    ];

    /// Persisted name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Life => "lifeInsurance",
            Category::Property => "propertyInsurance",
            Category::Casualty => "casualtyInsurance",
            Category::Health => "healthInsurance",
        }
    }

    /// Fixed number of questions in the category.
    #[must_use]
    pub fn ceiling(self) -> u32 {
        match self {
            Category::Life => 250,
            Category::Property => 200,
            Category::Casualty => 180,
            Category::Health => 159,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ScopeError::UnknownScope(s.to_string()))
    }
}
