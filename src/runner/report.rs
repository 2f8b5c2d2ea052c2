//! Per-item results and exit codes.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Error;

/// What an item did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Up,
    Down,
    Seed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Done,
    Failed(String),
    /// Dry run: the statements that would have executed.
    Rendered(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub name: String,
    pub kind: ItemKind,
    pub batch: Option<i64>,
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ItemStatus::Failed(_))
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub operation: &'static str,
    pub dry_run: bool,
    pub items: Vec<ItemReport>,
}

impl Report {
    pub fn new(operation: &'static str, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            items: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.items.iter().any(ItemReport::is_failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.is_failed())
    }

    pub fn count(&self, kind: ItemKind) -> usize {
        self.items.iter().filter(|i| i.kind == kind).count()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.has_failures() {
            ExitStatus::Failure
        } else {
            ExitStatus::Success
        }
    }
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    /// Declined at the confirmation prompt, or not permitted without `--force`.
    Declined,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Declined => 2,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        if err.is_refusal() {
            ExitStatus::Declined
        } else {
            ExitStatus::Failure
        }
    }
}

/// One line of `migrate:status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub name: String,
    /// `None` while the migration is pending.
    pub batch: Option<i64>,
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub next_batch: i64,
    pub migrations: Vec<StatusRow>,
    /// Ledger rows without a file on disk.
    pub missing: Vec<String>,
}

impl StatusReport {
    pub fn pending(&self) -> usize {
        self.migrations.iter().filter(|m| m.batch.is_none()).count()
    }
}

/// Output of `database:show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub exists: bool,
    pub ledger: bool,
    pub migrations: usize,
    pub last_batch: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, status: ItemStatus) -> ItemReport {
        ItemReport {
            name: name.to_string(),
            kind: ItemKind::Up,
            batch: Some(0),
            status,
        }
    }

    #[test]
    fn test_exit_status_follows_failures() {
        let mut report = Report::new("migrate", false);
        report.items.push(item("a", ItemStatus::Done));
        assert_eq!(report.exit_status(), ExitStatus::Success);

        report.items.push(item("b", ItemStatus::Failed("boom".into())));
        assert_eq!(report.exit_status().code(), 1);
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn test_refusals_map_to_exit_code_two() {
        assert_eq!(ExitStatus::from_error(&Error::UserDeclined).code(), 2);
        assert_eq!(
            ExitStatus::from_error(&Error::MissingRequiredParameter("batch")).code(),
            1
        );
    }
}
