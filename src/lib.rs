//! # strata
//!
//! Batch-aware migration runner. Migration files discovered on disk are
//! reconciled against a ledger table (`migration -> batch`): new files form
//! the next batch, rollbacks select batches by id and count.
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! # async fn example() -> strata::Result<()> {
//! let config = Config::discover(None)?;
//! let backend = SqlBackend::new("sqlite://app.db?mode=rwc", "migrations")?;
//! let mut migrator = Migrator::new(backend, config);
//! migrator.init().await?;
//! let report = migrator.migrate(&MigrateParams::default()).await?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod render;
pub mod runner;
pub mod scanner;
pub mod script;

pub use error::{Error, ExecutionError, Result};

/// Common imports.
pub mod prelude {
    pub use crate::backend::{Backend, DatabaseLifecycle, MemoryBackend, SqlBackend};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{Initialized, Ledger, LedgerSnapshot, MigrationRecord};
    pub use crate::reconcile::{
        ForwardPlan, PlanMode, PlannedMigration, RollbackSelection, RollbackTarget,
        compute_forward_set, compute_rollback_set, plan_forward,
    };
    pub use crate::runner::{
        ExitStatus, FreshParams, ItemKind, ItemStatus, MigrateParams, Migrator, RefreshParams,
        Report, ResetParams, RollbackParams, SeedParams,
    };
    pub use crate::scanner::{MigrationCandidate, Scanner};
    pub use crate::script::{Direction, Executor, Script, Statement};
}
