//! Migration ledger: the persisted `name -> batch` mapping.
//!
//! The ledger is the single source of truth for what has been applied. It is
//! read in full once per reconciliation and appended to whenever a previously
//! unknown migration is registered.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub name: String,
    pub batch: i64,
}

/// Outcome of [`Ledger::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialized {
    Created,
    AlreadyExists,
}

/// Consistent, in-memory view of the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    batches: BTreeMap<String, i64>,
}

impl LedgerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, batch: i64) {
        self.batches.insert(name.into(), batch);
    }

    /// Remove a record, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.batches.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.batches.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.batches.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Highest recorded batch, `None` for an empty ledger.
    pub fn max_batch(&self) -> Option<i64> {
        self.batches.values().copied().max()
    }

    /// Batch number the next forward run assigns to new migrations.
    pub fn next_batch(&self) -> i64 {
        next_batch_after(self.max_batch())
    }

    /// Records ordered by name.
    pub fn records(&self) -> impl Iterator<Item = MigrationRecord> + '_ {
        self.batches.iter().map(|(name, batch)| MigrationRecord {
            name: name.clone(),
            batch: *batch,
        })
    }
}

impl FromIterator<(String, i64)> for LedgerSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self {
            batches: iter.into_iter().collect(),
        }
    }
}

/// `max + 1`, or `0` when nothing has been recorded yet.
pub fn next_batch_after(max_batch: Option<i64>) -> i64 {
    max_batch.map_or(0, |max| max + 1)
}

/// Durable storage for migration records.
///
/// Connectivity failures are returned as errors and never swallowed. The one
/// expected failure, a uniqueness violation on [`Ledger::append`], is reported
/// as `Ok(false)`.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    /// Whether the ledger table is present.
    async fn exists(&mut self) -> Result<bool>;

    /// Create the ledger table. Idempotent.
    async fn initialize(&mut self) -> Result<Initialized>;

    /// Load every record in one read.
    async fn read_all(&mut self) -> Result<LedgerSnapshot>;

    /// Insert a new record; `Ok(false)` when `name` is already registered.
    async fn append(&mut self, name: &str, batch: i64) -> Result<bool>;

    /// Delete a record; `Ok(false)` when there was nothing to delete.
    async fn remove(&mut self, name: &str) -> Result<bool>;

    /// Highest recorded batch, `None` when the ledger is empty.
    async fn max_batch(&mut self) -> Result<Option<i64>>;
}
