use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::category::{BASIC_LEARNING_CEILING, Category};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScopeError {
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("question {question_id} is outside 1..={ceiling} for {scope}")]
    QuestionOutOfRange {
        scope: Scope,
        question_id: u32,
        ceiling: u32,
    },
}

/// Either the basic-learning track or one category.
///
/// Each scope carries its own independent progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    BasicLearning,
    Category(Category),
}

impl Scope {
    /// Persisted name of the basic-learning scope.
    pub const BASIC_LEARNING: &'static str = "basicLearning";

    #[must_use]
    pub fn ceiling(self) -> u32 {
        match self {
            Scope::BasicLearning => BASIC_LEARNING_CEILING,
            Scope::Category(category) => category.ceiling(),
        }
    }

    /// Check that `question_id` addresses an item of this scope.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::QuestionOutOfRange` when the id is 0 or above the ceiling.
    pub fn check_question(self, question_id: u32) -> Result<(), ScopeError> {
        let ceiling = self.ceiling();
        if question_id == 0 || question_id > ceiling {
            return Err(ScopeError::QuestionOutOfRange {
                scope: self,
                question_id,
                ceiling,
            });
        }
        Ok(())
    }
}

impl From<Category> for Scope {
    fn from(category: Category) -> Self {
        Scope::Category(category)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::BasicLearning => f.write_str(Self::BASIC_LEARNING),
            Scope::Category(category) => category.fmt(f),
        }
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::BASIC_LEARNING {
            return Ok(Scope::BasicLearning);
        }
        s.parse::<Category>().map(Scope::Category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_and_category_names() {
        assert_eq!("basicLearning".parse::<Scope>(), Ok(Scope::BasicLearning));
        assert_eq!(
            "lifeInsurance".parse::<Scope>(),
            Ok(Scope::Category(Category::Life))
        );
        assert_eq!(
            "motor".parse::<Scope>(),
            Err(ScopeError::UnknownScope("motor".into()))
        );
    }

    #[test]
    fn question_range_is_one_based_and_inclusive() {
        let scope = Scope::Category(Category::Health);
        assert!(scope.check_question(1).is_ok());
        assert!(scope.check_question(159).is_ok());
        assert!(matches!(
            scope.check_question(0),
            Err(ScopeError::QuestionOutOfRange { question_id: 0, .. })
        ));
        assert!(matches!(
            scope.check_question(160),
            Err(ScopeError::QuestionOutOfRange { ceiling: 159, .. })
        ));
    }
}
