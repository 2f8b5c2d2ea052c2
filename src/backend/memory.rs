//! In-memory backend.

use crate::error::{Error, ExecutionError, Result};
use crate::ledger::{Initialized, Ledger, LedgerSnapshot};
use crate::script::{Executor, Statement};

use super::DatabaseLifecycle;

/// Keeps the ledger and an execution log in memory.
///
/// Statements containing a registered failure pattern fail; everything else
/// succeeds and is appended to [`MemoryBackend::executed`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    database: bool,
    ledger: Option<LedgerSnapshot>,
    executed: Vec<String>,
    failures: Vec<String>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An existing database with an initialized, empty ledger.
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            database: true,
            ledger: Some(LedgerSnapshot::new()),
            executed: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// An existing database without a ledger table.
    pub fn uninitialized() -> Self {
        Self {
            ledger: None,
            ..Self::new()
        }
    }

    /// An existing database whose ledger already holds `records`.
    pub fn with_records<'a>(records: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        Self {
            ledger: Some(records.into_iter().map(|(n, b)| (n.to_string(), b)).collect()),
            ..Self::new()
        }
    }

    /// Make every statement containing `pattern` fail.
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        self.failures.push(pattern.into());
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Current ledger contents, `None` when the table does not exist.
    pub fn snapshot(&self) -> Option<&LedgerSnapshot> {
        self.ledger.as_ref()
    }

    fn ledger_mut(&mut self) -> Result<&mut LedgerSnapshot> {
        self.ledger.as_mut().ok_or_else(|| Error::LedgerUnavailable {
            table: "memory".to_string(),
        })
    }
}

impl Ledger for MemoryBackend {
    async fn exists(&mut self) -> Result<bool> {
        Ok(self.ledger.is_some())
    }

    async fn initialize(&mut self) -> Result<Initialized> {
        if !self.database {
            return Err(Error::DatabaseMissing(self.name.clone()));
        }
        if self.ledger.is_some() {
            return Ok(Initialized::AlreadyExists);
        }
        self.ledger = Some(LedgerSnapshot::new());
        Ok(Initialized::Created)
    }

    async fn read_all(&mut self) -> Result<LedgerSnapshot> {
        Ok(self.ledger_mut()?.clone())
    }

    async fn append(&mut self, name: &str, batch: i64) -> Result<bool> {
        let ledger = self.ledger_mut()?;
        if ledger.contains(name) {
            return Ok(false);
        }
        ledger.insert(name, batch);
        Ok(true)
    }

    async fn remove(&mut self, name: &str) -> Result<bool> {
        Ok(self.ledger_mut()?.remove(name))
    }

    async fn max_batch(&mut self) -> Result<Option<i64>> {
        Ok(self.ledger_mut()?.max_batch())
    }
}

impl Executor for MemoryBackend {
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<(), ExecutionError> {
        if !self.database {
            return Err(ExecutionError::new(format!(
                "database `{}` does not exist",
                self.name
            )));
        }
        if let Some(pattern) = self.failures.iter().find(|p| statement.sql().contains(p.as_str())) {
            return Err(ExecutionError::new(format!("statement failed: {}", pattern)));
        }
        self.executed.push(statement.sql().to_string());
        Ok(())
    }
}

impl DatabaseLifecycle for MemoryBackend {
    fn database_name(&self) -> String {
        self.name.clone()
    }

    async fn database_exists(&mut self) -> Result<bool> {
        Ok(self.database)
    }

    async fn create_database(&mut self, if_not_exists: bool) -> Result<bool> {
        if self.database {
            if if_not_exists {
                return Ok(false);
            }
            return Err(Error::DatabaseExists(self.name.clone()));
        }
        self.database = true;
        Ok(true)
    }

    async fn drop_database(&mut self, if_exists: bool) -> Result<bool> {
        if !self.database {
            if if_exists {
                return Ok(false);
            }
            return Err(Error::DatabaseMissing(self.name.clone()));
        }
        self.database = false;
        self.ledger = None;
        Ok(true)
    }
}
