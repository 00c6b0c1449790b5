mod category;
mod progress;
mod scope;
mod user;

pub use category::{BASIC_LEARNING_CEILING, Category};
pub use progress::{CategoryProgress, ProgressRecord, ProgressRecordError, ScopeProgress};
pub use scope::{Scope, ScopeError};
pub use user::{GUEST_DISPLAY_NAME, Registration, UserInfo, UserInfoError};
