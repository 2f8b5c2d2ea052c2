//! Migration commands: sequencing, guarding and per-item execution.
//!
//! Submodules:
//! - `guard`: environment / confirmation checks
//! - `report`: per-item results, status and exit codes
//! - `seed`: seed discovery

pub mod guard;
pub mod report;
mod seed;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{Initialized, LedgerSnapshot};
use crate::reconcile::{
    PlanMode, PlannedMigration, RollbackSelection, compute_forward_set, compute_rollback_set,
    plan_forward,
};
use crate::scanner::{MigrationCandidate, Scanner};
use crate::script::{Direction, Script};

pub use guard::{Prompt, StdinPrompt};
pub use report::{
    DatabaseInfo, ExitStatus, ItemKind, ItemReport, ItemStatus, Report, StatusReport, StatusRow,
};

/// Run seed files after migrating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedParams {
    /// Subdirectory of the seed path to run instead of its root.
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrateParams {
    pub dry_run: bool,
    pub force: bool,
    pub seed: Option<SeedParams>,
}

#[derive(Debug, Clone, Default)]
pub struct FreshParams {
    pub dry_run: bool,
    pub force: bool,
    pub yes: bool,
    pub seed: Option<SeedParams>,
}

#[derive(Debug, Clone, Default)]
pub struct ResetParams {
    pub dry_run: bool,
    pub force: bool,
    pub yes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshParams {
    pub force: bool,
    pub yes: bool,
    pub seed: Option<SeedParams>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackParams {
    /// Upper batch to roll back; required.
    pub batch: Option<i64>,
    /// Extra batches below `batch`; negative reaches down to batch 0.
    pub take: i64,
    pub dry_run: bool,
    pub force: bool,
    pub yes: bool,
}

/// Drives the reconciler against one backend.
pub struct Migrator<B> {
    backend: B,
    config: Config,
    scanner: Scanner,
    prompt: Box<dyn Prompt>,
}

impl<B: Backend> Migrator<B> {
    pub fn new(backend: B, config: Config) -> Self {
        let scanner = Scanner::new(config.migrations.extension.clone());
        Self {
            backend,
            config,
            scanner,
            prompt: Box::new(StdinPrompt),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply every migration file not yet in the ledger as one new batch.
    pub async fn migrate(&mut self, params: &MigrateParams) -> Result<Report> {
        if !params.dry_run {
            self.guard("migrate", params.force, None)?;
        }
        self.ensure_ledger().await?;
        let candidates = self.scan()?;

        let mut report = Report::new("migrate", params.dry_run);
        self.forward(&candidates, params.dry_run, &mut report).await?;
        self.seed_after(params.seed.as_ref(), params.dry_run, &mut report).await;
        Ok(report)
    }

    /// Drop and recreate the database, then run every migration as batch 0.
    pub async fn fresh(&mut self, params: &FreshParams) -> Result<Report> {
        let candidates = self.scan()?;
        let mut report = Report::new("migrate:fresh", params.dry_run);

        if params.dry_run {
            let plan = plan_forward(&LedgerSnapshot::new(), &candidates);
            let entries: Vec<_> = plan.runnable().cloned().collect();
            self.run_planned(&entries, Direction::Up, true, &mut report).await;
            self.seed_after(params.seed.as_ref(), true, &mut report).await;
            return Ok(report);
        }

        let question = format!(
            "Drop every table in `{}` and re-run all migrations?",
            self.backend.database_name()
        );
        self.guard("migrate:fresh", params.force, Some((params.yes, question.as_str())))?;

        self.backend.drop_database(true).await?;
        self.backend.create_database(true).await?;
        self.backend.initialize().await?;
        info!(database = %self.backend.database_name(), "database recreated");

        self.forward(&candidates, false, &mut report).await?;
        self.seed_after(params.seed.as_ref(), false, &mut report).await;
        Ok(report)
    }

    /// Roll back every recorded migration, newest first.
    pub async fn reset(&mut self, params: &ResetParams) -> Result<Report> {
        if !params.dry_run {
            self.guard(
                "migrate:reset",
                params.force,
                Some((params.yes, "Roll back every migration?")),
            )?;
        }
        let mut report = Report::new("migrate:reset", params.dry_run);
        self.rollback_selection(RollbackSelection::all(), params.dry_run, &mut report)
            .await?;
        Ok(report)
    }

    /// Reset, then migrate. Stops after the reset when it failed.
    pub async fn refresh(&mut self, params: &RefreshParams) -> Result<Report> {
        self.guard(
            "migrate:refresh",
            params.force,
            Some((params.yes, "Roll back and re-run every migration?")),
        )?;

        let mut report = Report::new("migrate:refresh", false);
        self.rollback_selection(RollbackSelection::all(), false, &mut report)
            .await?;
        if report.has_failures() {
            warn!("reset failed, not migrating");
            return Ok(report);
        }

        let candidates = self.scan()?;
        self.forward(&candidates, false, &mut report).await?;
        self.seed_after(params.seed.as_ref(), false, &mut report).await;
        Ok(report)
    }

    /// Roll back batch `params.batch` and `params.take` batches below it.
    pub async fn rollback(&mut self, params: &RollbackParams) -> Result<Report> {
        let batch = params
            .batch
            .ok_or(Error::MissingRequiredParameter("batch"))?;

        if !params.dry_run {
            let question = if params.take < 0 {
                format!("Roll back batch {} and every batch below it?", batch)
            } else {
                format!(
                    "Roll back batches {}..={}?",
                    batch.saturating_sub(params.take).max(0),
                    batch
                )
            };
            self.guard("migrate:rollback", params.force, Some((params.yes, question.as_str())))?;
        }

        let mut report = Report::new("migrate:rollback", params.dry_run);
        self.rollback_selection(
            RollbackSelection::batch(batch, params.take),
            params.dry_run,
            &mut report,
        )
        .await?;
        Ok(report)
    }

    /// Every migration file with its batch, plus ledger rows without a file.
    pub async fn status(&mut self) -> Result<StatusReport> {
        self.ensure_ledger().await?;
        let candidates = self.scan()?;
        let snapshot = self.backend.read_all().await?;

        let migrations = candidates
            .iter()
            .map(|c| StatusRow {
                name: c.name.clone(),
                batch: snapshot.get(&c.name),
                source: c.source_path.clone(),
            })
            .collect();
        let missing = snapshot
            .records()
            .filter(|r| !candidates.iter().any(|c| c.name == r.name))
            .map(|r| r.name)
            .collect();

        Ok(StatusReport {
            next_batch: snapshot.next_batch(),
            migrations,
            missing,
        })
    }

    /// Create the ledger table.
    pub async fn init(&mut self) -> Result<Initialized> {
        self.backend.initialize().await
    }

    /// Create the configured database; `Ok(false)` when it already exists.
    pub async fn database_create(&mut self) -> Result<bool> {
        self.backend.create_database(true).await
    }

    /// Drop the configured database; `Ok(false)` when it did not exist.
    pub async fn database_drop(&mut self, force: bool, yes: bool) -> Result<bool> {
        let question = format!("Drop database `{}`?", self.backend.database_name());
        self.guard("database:drop", force, Some((yes, question.as_str())))?;
        self.backend.drop_database(true).await
    }

    pub async fn database_show(&mut self) -> Result<DatabaseInfo> {
        let mut info = DatabaseInfo {
            name: self.backend.database_name(),
            exists: self.backend.database_exists().await?,
            ledger: false,
            migrations: 0,
            last_batch: None,
        };
        if info.exists && self.backend.exists().await? {
            info.ledger = true;
            info.migrations = self.backend.read_all().await?.len();
            info.last_batch = self.backend.max_batch().await?;
        }
        Ok(info)
    }

    fn guard(
        &mut self,
        command: &'static str,
        force: bool,
        confirmation: Option<(bool, &str)>,
    ) -> Result<()> {
        guard::check(
            command,
            &self.config.environment,
            self.config.is_development(),
            force,
            confirmation,
            self.prompt.as_mut(),
        )
    }

    async fn ensure_ledger(&mut self) -> Result<()> {
        if self.backend.exists().await? {
            Ok(())
        } else {
            Err(Error::LedgerUnavailable {
                table: self.config.database.ledger_table.clone(),
            })
        }
    }

    fn scan(&self) -> Result<Vec<MigrationCandidate>> {
        let report = self
            .scanner
            .scan(&self.config.migrations.path, &self.config.migrations.vendor_paths)?;
        if self.config.migrations.deny_shadowing {
            report.deny_shadowing()?;
        }
        Ok(report.candidates)
    }

    /// Plan and run a forward pass. A failed `up` withdraws its ledger row so
    /// the next run retries it.
    async fn forward(
        &mut self,
        candidates: &[MigrationCandidate],
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        let mode = if dry_run {
            PlanMode::DryRun
        } else {
            PlanMode::Persist
        };
        let plan = compute_forward_set(&mut self.backend, candidates, mode).await?;
        let entries: Vec<_> = plan.runnable().cloned().collect();
        if entries.is_empty() {
            info!("nothing to migrate");
        }

        let start = report.items.len();
        self.run_planned(&entries, Direction::Up, dry_run, report).await;

        if !dry_run {
            for item in report.items[start..].iter().filter(|i| i.is_failed()) {
                self.backend.remove(&item.name).await?;
                warn!(migration = %item.name, "up failed, ledger entry withdrawn");
            }
        }
        Ok(())
    }

    /// Run `down` for the selected batches. Rolled-back migrations leave the ledger.
    async fn rollback_selection(
        &mut self,
        selection: RollbackSelection,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        self.ensure_ledger().await?;
        let candidates = self.scan()?;
        let snapshot = self.backend.read_all().await?;

        let orphaned = snapshot
            .records()
            .filter(|r| !candidates.iter().any(|c| c.name == r.name));
        for record in orphaned {
            warn!(migration = %record.name, "recorded migration has no file, cannot roll back");
        }

        let entries = compute_rollback_set(&snapshot, &candidates, selection);
        if entries.is_empty() {
            info!("nothing to roll back");
        }

        let start = report.items.len();
        self.run_planned(&entries, Direction::Down, dry_run, report).await;

        if !dry_run {
            for item in report.items[start..].iter().filter(|i| !i.is_failed()) {
                self.backend.remove(&item.name).await?;
            }
        }
        Ok(())
    }

    async fn run_planned(
        &mut self,
        entries: &[PlannedMigration],
        direction: Direction,
        dry_run: bool,
        report: &mut Report,
    ) {
        let kind = match direction {
            Direction::Up => ItemKind::Up,
            Direction::Down => ItemKind::Down,
        };
        for entry in entries {
            let status = self.run_script(&entry.candidate, direction, dry_run).await;
            report.items.push(ItemReport {
                name: entry.name().to_string(),
                kind,
                batch: Some(entry.batch),
                status,
            });
        }
    }

    /// Execute (or render) one file's statements. The first failing statement
    /// fails the file; later files are unaffected.
    async fn run_script(
        &mut self,
        candidate: &MigrationCandidate,
        direction: Direction,
        dry_run: bool,
    ) -> ItemStatus {
        let script = match Script::load(&candidate.source_path) {
            Ok(script) => script,
            Err(e) => {
                warn!(migration = %candidate.name, error = %e, "failed to load");
                return ItemStatus::Failed(e.to_string());
            }
        };

        let statements = script.statements(direction);
        if dry_run {
            return ItemStatus::Rendered(statements.iter().map(|s| s.to_string()).collect());
        }

        for (i, statement) in statements.iter().enumerate() {
            if let Err(e) = self.backend.execute(statement).await {
                warn!(
                    migration = %candidate.name,
                    %direction,
                    step = i + 1,
                    error = %e,
                    "statement failed"
                );
                return ItemStatus::Failed(format!(
                    "statement {}/{}: {}",
                    i + 1,
                    statements.len(),
                    e
                ));
            }
        }
        info!(migration = %candidate.name, %direction, "done");
        ItemStatus::Done
    }

    /// Seed when requested and nothing in `report` failed.
    async fn seed_after(&mut self, seed: Option<&SeedParams>, dry_run: bool, report: &mut Report) {
        let Some(seed) = seed else {
            return;
        };
        if report.has_failures() {
            warn!("migrations failed, skipping seeders");
            return;
        }

        let seeds = match seed::discover(&self.config, &self.scanner, seed) {
            Ok(seeds) => seeds,
            Err(e) => {
                report.items.push(ItemReport {
                    name: seed::display_name(&self.config, seed),
                    kind: ItemKind::Seed,
                    batch: None,
                    status: ItemStatus::Failed(e.to_string()),
                });
                return;
            }
        };

        for candidate in seeds {
            let status = self.run_script(&candidate, Direction::Up, dry_run).await;
            report.items.push(ItemReport {
                name: candidate.name,
                kind: ItemKind::Seed,
                batch: None,
                status,
            });
        }
    }
}
