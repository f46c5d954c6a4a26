//! bugtrack-core: Core library for the bugtrack bug tracker
//!
//! Provides the data model, the SQLite store, email notifications, the
//! update workflow, and CSV/PDF exports.

pub mod bug;
pub mod config;
pub mod error;
pub mod export;
pub mod notify;
pub mod store;
pub mod workflow;

pub use bug::{Bug, BugChanges, Developer, NewBug, NewDeveloper, Priority, Status, UNASSIGNED};
pub use config::Config;
pub use error::Error;
pub use notify::{LogNotifier, Notification, Notifier, SmtpNotifier};
pub use store::{BugUpdate, Store};
pub use workflow::{BugService, NotificationKind, NotificationOutcome, UpdateOutcome};

/// Result type for bugtrack operations
pub type Result<T> = std::result::Result<T, Error>;
