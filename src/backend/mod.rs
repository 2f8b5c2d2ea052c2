//! Concrete collaborators: ledger storage, statement execution and database lifecycle.
//!
//! - `sql`: sqlx `Any` driver (PostgreSQL and SQLite URLs)
//! - `memory`: in-process backend for tests and embedding

mod memory;
mod sql;

pub use memory::MemoryBackend;
pub use sql::SqlBackend;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::script::Executor;

/// Create, drop and inspect the target database.
#[allow(async_fn_in_trait)]
pub trait DatabaseLifecycle {
    /// Name of the configured database (file path for SQLite).
    fn database_name(&self) -> String;

    async fn database_exists(&mut self) -> Result<bool>;

    /// `Ok(false)` when the database already exists and `if_not_exists` is set.
    async fn create_database(&mut self, if_not_exists: bool) -> Result<bool>;

    /// `Ok(false)` when the database is missing and `if_exists` is set.
    async fn drop_database(&mut self, if_exists: bool) -> Result<bool>;
}

/// Everything the runner needs from a database.
pub trait Backend: Ledger + Executor + DatabaseLifecycle {}

impl<T: Ledger + Executor + DatabaseLifecycle> Backend for T {}

/// Ledger table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}
