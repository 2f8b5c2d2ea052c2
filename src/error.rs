//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// The ledger table is missing; nothing can be reconciled without it.
    #[error("migration ledger `{table}` does not exist (run `strata migrate:init` first)")]
    LedgerUnavailable { table: String },

    /// A migration name was already registered in the ledger.
    #[error("migration `{0}` is already registered in the ledger")]
    DuplicateMigrationName(String),

    /// A required parameter was not supplied.
    #[error("missing required parameter `{0}`")]
    MissingRequiredParameter(&'static str),

    /// The interactive confirmation was answered with "no".
    #[error("operation cancelled")]
    UserDeclined,

    /// A destructive command was attempted outside development without `--force`.
    #[error("refusing to run `{command}` in the `{environment}` environment without --force")]
    NotPermitted {
        command: &'static str,
        environment: String,
    },

    /// Two migration paths contribute the same migration name.
    #[error("migration `{name}` in {} is shadowed by {}", .first.display(), .second.display())]
    NameConflict {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// The primary migration directory could not be read.
    #[error("migration directory {} not found", .0.display())]
    MissingDirectory(PathBuf),

    /// A migration script could not be parsed.
    #[error("failed to parse {}: {message}", .path.display())]
    Script { path: PathBuf, message: String },

    #[error("database `{0}` already exists")]
    DatabaseExists(String),

    #[error("database `{0}` does not exist")]
    DatabaseMissing(String),

    #[error("invalid ledger table name `{0}`")]
    InvalidTableName(String),

    #[error("invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// True for the errors that map to the "declined / not permitted" exit code.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Error::UserDeclined | Error::NotPermitted { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single statement, recorded against one migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for ExecutionError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}
