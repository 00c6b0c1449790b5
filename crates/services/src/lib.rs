#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod migration;
pub mod mode_transition;
pub mod progress_store;
pub mod tracker;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use error::{
    AppServicesError, MigrationError, ModeTransitionError, ProgressStoreError, TrackerError,
};
pub use migration::{LegacyMigrator, MigrationMarker, MigrationReport, MigrationState};
pub use mode_transition::ModeTransitionManager;
pub use progress_store::ProgressStore;
pub use tracker::{AnswerOutcome, SessionProgressTracker};
