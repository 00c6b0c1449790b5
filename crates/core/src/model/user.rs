use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display name used for the guest identity seeded on first load.
pub const GUEST_DISPLAY_NAME: &str = "Guest";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserInfoError {
    #[error("display name cannot be empty")]
    EmptyDisplayName,
}

/// Identity attached to the progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    display_name: String,
    #[serde(default)]
    registration_date: Option<NaiveDate>,
    #[serde(default)]
    exam_date: Option<NaiveDate>,
    is_registered: bool,
    is_demo_mode: bool,
}

impl UserInfo {
    /// The demo identity every fresh install starts with.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            display_name: GUEST_DISPLAY_NAME.to_string(),
            registration_date: None,
            exam_date: None,
            is_registered: false,
            is_demo_mode: true,
        }
    }

    /// Build a registered identity from a registration request.
    #[must_use]
    pub fn registered(registration: &Registration, today: NaiveDate) -> Self {
        Self {
            display_name: registration.display_name().to_string(),
            registration_date: Some(today),
            exam_date: registration.exam_date(),
            is_registered: true,
            is_demo_mode: false,
        }
    }

    /// Rehydrate an identity from a persisted blob.
    ///
    /// A registered identity is never in demo mode; a blank name falls back to
    /// the guest name.
    #[must_use]
    pub fn from_persisted(
        display_name: &str,
        registration_date: Option<NaiveDate>,
        exam_date: Option<NaiveDate>,
        is_registered: bool,
        is_demo_mode: bool,
    ) -> Self {
        let trimmed = display_name.trim();
        Self {
            display_name: if trimmed.is_empty() {
                GUEST_DISPLAY_NAME.to_string()
            } else {
                trimmed.to_string()
            },
            registration_date,
            exam_date,
            is_registered,
            is_demo_mode: is_demo_mode && !is_registered,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn registration_date(&self) -> Option<NaiveDate> {
        self.registration_date
    }

    #[must_use]
    pub fn exam_date(&self) -> Option<NaiveDate> {
        self.exam_date
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.is_registered
    }

    #[must_use]
    pub fn is_demo_mode(&self) -> bool {
        self.is_demo_mode
    }

    /// True while the identity is still the untouched guest seeded on first load.
    #[must_use]
    pub fn is_default_guest(&self) -> bool {
        *self == Self::guest()
    }
}

impl Default for UserInfo {
    fn default() -> Self {
        Self::guest()
    }
}

/// Details supplied by the learner when leaving demo mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    display_name: String,
    exam_date: Option<NaiveDate>,
}

impl Registration {
    /// Create a validated registration request.
    ///
    /// # Errors
    ///
    /// Returns `UserInfoError::EmptyDisplayName` if the name is empty after trimming.
    pub fn new(
        display_name: impl Into<String>,
        exam_date: Option<NaiveDate>,
    ) -> Result<Self, UserInfoError> {
        let raw = display_name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UserInfoError::EmptyDisplayName);
        }
        Ok(Self {
            display_name: trimmed.to_string(),
            exam_date,
        })
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn exam_date(&self) -> Option<NaiveDate> {
        self.exam_date
    }
}
