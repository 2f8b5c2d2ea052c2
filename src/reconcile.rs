//! Batch reconciliation: decide which migrations run, in which batch, in which order.
//!
//! Every candidate is evaluated against the ledger snapshot:
//!
//! - unknown names are new and get the next batch number, computed once per
//!   pass as `max_batch + 1` (or `0` for an empty ledger);
//! - in forward mode, known names with `batch <= next_batch - 1` are surfaced
//!   as pending but are not runnable;
//! - in rollback mode, known names whose batch falls inside the selected range
//!   are returned in reverse discovery order.
//!
//! This module only plans. Executing statements is the runner's job.

use tracing::debug;

use crate::error::Result;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::scanner::MigrationCandidate;

/// Whether forward planning may write to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Register new names in the ledger as they are discovered.
    Persist,
    /// Leave the ledger untouched.
    DryRun,
}

/// A candidate together with the batch it belongs to for this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMigration {
    pub candidate: MigrationCandidate,
    pub batch: i64,
    pub is_new: bool,
}

impl PlannedMigration {
    pub fn name(&self) -> &str {
        &self.candidate.name
    }
}

/// Result of forward planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPlan {
    pub next_batch: i64,
    pub entries: Vec<PlannedMigration>,
}

impl ForwardPlan {
    /// Entries that belong to this pass, in discovery order.
    pub fn runnable(&self) -> impl Iterator<Item = &PlannedMigration> {
        self.entries.iter().filter(move |e| e.batch == self.next_batch)
    }

    /// Entries recorded by an earlier pass.
    pub fn pending(&self) -> impl Iterator<Item = &PlannedMigration> {
        self.entries.iter().filter(move |e| e.batch != self.next_batch)
    }
}

/// Batch to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Every recorded batch.
    All,
    /// An explicit batch id.
    Batch(i64),
}

/// Rollback bounds: `target` is the upper batch, `take` how many batches below it.
///
/// `take == 0` selects only the target batch (or everything for
/// [`RollbackTarget::All`]); a negative `take` reaches down to batch 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSelection {
    pub target: RollbackTarget,
    pub take: i64,
}

impl RollbackSelection {
    pub fn all() -> Self {
        Self {
            target: RollbackTarget::All,
            take: 0,
        }
    }

    pub fn batch(batch: i64, take: i64) -> Self {
        Self {
            target: RollbackTarget::Batch(batch),
            take,
        }
    }

    /// Inclusive `(lower, upper)` batch range, `None` when there is nothing to select.
    pub fn range(&self, snapshot: &LedgerSnapshot) -> Option<(i64, i64)> {
        let (upper, unbounded) = match self.target {
            RollbackTarget::All => (snapshot.max_batch()?, true),
            RollbackTarget::Batch(batch) => (batch, false),
        };
        let lower = if self.take < 0 || (self.take == 0 && unbounded) {
            0
        } else {
            upper.saturating_sub(self.take).max(0)
        };
        Some((lower, upper))
    }
}

/// Plan a forward pass against a snapshot without side effects.
pub fn plan_forward(snapshot: &LedgerSnapshot, candidates: &[MigrationCandidate]) -> ForwardPlan {
    let next_batch = snapshot.next_batch();
    let entries = candidates
        .iter()
        .filter_map(|candidate| match snapshot.get(&candidate.name) {
            None => Some(PlannedMigration {
                candidate: candidate.clone(),
                batch: next_batch,
                is_new: true,
            }),
            Some(recorded) if recorded <= next_batch - 1 => Some(PlannedMigration {
                candidate: candidate.clone(),
                batch: recorded,
                is_new: false,
            }),
            Some(_) => None,
        })
        .collect();

    ForwardPlan {
        next_batch,
        entries,
    }
}

/// Read the ledger, plan a forward pass and, in [`PlanMode::Persist`],
/// register every new name under the next batch immediately.
///
/// A new name whose append is rejected was registered concurrently by someone
/// else; it is dropped from the plan.
pub async fn compute_forward_set<L: Ledger>(
    ledger: &mut L,
    candidates: &[MigrationCandidate],
    mode: PlanMode,
) -> Result<ForwardPlan> {
    let snapshot = ledger.read_all().await?;
    let mut plan = plan_forward(&snapshot, candidates);

    if mode == PlanMode::DryRun {
        return Ok(plan);
    }

    let mut entries = Vec::with_capacity(plan.entries.len());
    for entry in plan.entries {
        if entry.is_new && !ledger.append(entry.name(), entry.batch).await? {
            debug!(migration = %entry.name(), "already registered, skipping");
            continue;
        }
        entries.push(entry);
    }
    plan.entries = entries;

    debug!(
        next_batch = plan.next_batch,
        runnable = plan.runnable().count(),
        "forward plan computed"
    );
    Ok(plan)
}

/// Known candidates inside the selected batch range, most recently discovered first.
///
/// Unknown candidates are never registered by a rollback.
pub fn compute_rollback_set(
    snapshot: &LedgerSnapshot,
    candidates: &[MigrationCandidate],
    selection: RollbackSelection,
) -> Vec<PlannedMigration> {
    let Some((lower, upper)) = selection.range(snapshot) else {
        return Vec::new();
    };

    candidates
        .iter()
        .rev()
        .filter_map(|candidate| {
            let recorded = snapshot.get(&candidate.name)?;
            (lower..=upper).contains(&recorded).then(|| PlannedMigration {
                candidate: candidate.clone(),
                batch: recorded,
                is_new: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Initialized;
    use pretty_assertions::assert_eq;

    fn candidates(names: &[&str]) -> Vec<MigrationCandidate> {
        names
            .iter()
            .map(|n| MigrationCandidate::new(*n, format!("/migrations/{}.sql", n)))
            .collect()
    }

    fn snapshot(records: &[(&str, i64)]) -> LedgerSnapshot {
        records.iter().map(|(n, b)| (n.to_string(), *b)).collect()
    }

    fn names(entries: &[PlannedMigration]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_empty_ledger_makes_everything_new_in_batch_zero() {
        let plan = plan_forward(&LedgerSnapshot::new(), &candidates(&["001_init", "002_add_col"]));
        assert_eq!(plan.next_batch, 0);
        assert!(plan.entries.iter().all(|e| e.is_new && e.batch == 0));
        assert_eq!(plan.runnable().count(), 2);
    }

    #[test]
    fn test_new_file_gets_next_batch_and_old_one_is_pending() {
        let plan = plan_forward(
            &snapshot(&[("001_init", 0)]),
            &candidates(&["001_init", "002_add_col"]),
        );
        assert_eq!(plan.next_batch, 1);
        let runnable: Vec<_> = plan.runnable().map(|e| e.name()).collect();
        assert_eq!(runnable, ["002_add_col"]);
        let pending: Vec<_> = plan.pending().map(|e| (e.name(), e.batch)).collect();
        assert_eq!(pending, [("001_init", 0)]);
    }

    #[test]
    fn test_rollback_single_batch() {
        let ledger = snapshot(&[("a", 0), ("b", 0), ("c", 1), ("d", 1)]);
        let files = candidates(&["a", "b", "c", "d"]);
        let set = compute_rollback_set(&ledger, &files, RollbackSelection::batch(1, 0));
        assert_eq!(names(&set), ["d", "c"]);
    }

    #[test]
    fn test_rollback_with_take_reaches_lower_batches() {
        let ledger = snapshot(&[("a", 0), ("b", 0), ("c", 1), ("d", 1)]);
        let files = candidates(&["a", "b", "c", "d"]);
        let set = compute_rollback_set(&ledger, &files, RollbackSelection::batch(1, 1));
        assert_eq!(names(&set), ["d", "c", "b", "a"]);
    }

    #[test]
    fn test_rollback_excludes_newer_batches_and_unknown_files() {
        let ledger = snapshot(&[("a", 0), ("b", 1), ("c", 2)]);
        let files = candidates(&["a", "b", "c", "new"]);
        let set = compute_rollback_set(&ledger, &files, RollbackSelection::batch(1, 0));
        assert_eq!(names(&set), ["b"]);
    }

    #[test]
    fn test_negative_take_reaches_batch_zero() {
        let ledger = snapshot(&[("a", 0), ("b", 1), ("c", 2), ("d", 3)]);
        let files = candidates(&["a", "b", "c", "d"]);
        let set = compute_rollback_set(&ledger, &files, RollbackSelection::batch(2, -1));
        assert_eq!(names(&set), ["c", "b", "a"]);
        assert_eq!(RollbackSelection::batch(2, -5).range(&ledger), Some((0, 2)));
    }

    #[test]
    fn test_rollback_all() {
        let ledger = snapshot(&[("a", 0), ("b", 1), ("c", 2)]);
        let files = candidates(&["a", "b", "c"]);
        let set = compute_rollback_set(&ledger, &files, RollbackSelection::all());
        assert_eq!(names(&set), ["c", "b", "a"]);
    }

    /// Reads an empty ledger but rejects appends for `taken`, as if another
    /// runner registered those names between the read and the insert.
    struct RacingLedger {
        taken: Vec<&'static str>,
        appended: Vec<String>,
    }

    impl Ledger for RacingLedger {
        async fn exists(&mut self) -> Result<bool> {
            Ok(true)
        }

        async fn initialize(&mut self) -> Result<Initialized> {
            Ok(Initialized::AlreadyExists)
        }

        async fn read_all(&mut self) -> Result<LedgerSnapshot> {
            Ok(LedgerSnapshot::new())
        }

        async fn append(&mut self, name: &str, _batch: i64) -> Result<bool> {
            if self.taken.iter().any(|t| *t == name) {
                return Ok(false);
            }
            self.appended.push(name.to_string());
            Ok(true)
        }

        async fn remove(&mut self, _name: &str) -> Result<bool> {
            Ok(false)
        }

        async fn max_batch(&mut self) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_name_registered_concurrently_is_dropped_from_plan() {
        let mut ledger = RacingLedger {
            taken: vec!["b"],
            appended: Vec::new(),
        };
        let files = candidates(&["a", "b", "c"]);

        let plan = compute_forward_set(&mut ledger, &files, PlanMode::Persist)
            .await
            .unwrap();

        assert_eq!(names(&plan.entries), ["a", "c"]);
        let runnable: Vec<_> = plan.runnable().map(|e| e.name()).collect();
        assert_eq!(runnable, ["a", "c"]);
        assert_eq!(ledger.appended, ["a", "c"]);
    }

    #[test]
    fn test_rollback_on_empty_ledger_is_empty() {
        let files = candidates(&["a", "b"]);
        assert!(compute_rollback_set(&LedgerSnapshot::new(), &files, RollbackSelection::all()).is_empty());
        assert!(
            compute_rollback_set(&LedgerSnapshot::new(), &files, RollbackSelection::batch(0, 0)).is_empty()
        );
    }
}
