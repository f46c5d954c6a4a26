//! Error types for bugtrack

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bug not found: {0}")]
    BugNotFound(i64),

    #[error("Developer {0} does not exist")]
    UnknownDeveloper(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unsupported schema version {found} (latest known: {latest})")]
    SchemaVersion { found: u32, latest: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The identifier does not resolve to a record
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BugNotFound(_))
    }

    /// The caller supplied malformed or inconsistent input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownDeveloper(_)
                | Error::Validation(_)
                | Error::InvalidStatus(_)
                | Error::InvalidPriority(_)
        )
    }
}
