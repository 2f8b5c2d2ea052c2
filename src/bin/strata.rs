//! strata - batch-aware database migrations

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use strata::backend::{DatabaseLifecycle, SqlBackend};
use strata::config::Config;
use strata::ledger::Initialized;
use strata::render;
use strata::runner::{
    ExitStatus, FreshParams, MigrateParams, Migrator, RefreshParams, ResetParams, RollbackParams,
    SeedParams,
};

#[derive(Parser)]
#[command(name = "strata", version, about = "Batch-aware database migrations")]
struct Cli {
    /// Config file (defaults to ./strata.toml, then the user config dir)
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides `database.url`
    #[arg(long, global = true, env = "STRATA_DATABASE_URL")]
    database_url: Option<String>,

    /// Environment name, overrides `environment`
    #[arg(long, global = true, env = "STRATA_ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SeedArgs {
    /// Run seeders after migrating
    #[arg(long)]
    seed: bool,

    /// Seed subdirectory to run (implies --seed)
    #[arg(long, value_name = "NAMESPACE")]
    seed_namespace: Option<String>,
}

impl SeedArgs {
    fn params(self) -> Option<SeedParams> {
        if self.seed || self.seed_namespace.is_some() {
            Some(SeedParams {
                namespace: self.seed_namespace,
            })
        } else {
            None
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending migrations as a new batch
    Migrate {
        /// Print the statements instead of executing them
        #[arg(long)]
        dry_run: bool,
        /// Allow running outside development
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        seed: SeedArgs,
    },
    /// Drop and recreate the database, then run every migration
    #[command(name = "migrate:fresh")]
    Fresh {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        seed: SeedArgs,
    },
    /// Roll back every migration
    #[command(name = "migrate:reset")]
    Reset {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Roll back every migration, then migrate again
    #[command(name = "migrate:refresh")]
    Refresh {
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        seed: SeedArgs,
    },
    /// Roll back a batch and optionally the batches below it
    #[command(name = "migrate:rollback")]
    Rollback {
        /// Highest batch to roll back
        #[arg(long)]
        batch: Option<i64>,
        /// Number of batches below --batch to include; negative means all
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        take: i64,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Show which migrations ran and in which batch
    #[command(name = "migrate:status")]
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create the migrations ledger table
    #[command(name = "migrate:init")]
    Init,
    /// Create the configured database
    #[command(name = "database:create")]
    DatabaseCreate,
    /// Drop the configured database
    #[command(name = "database:drop")]
    DatabaseDrop {
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Show database and ledger state
    #[command(name = "database:show")]
    DatabaseShow {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let status = match run().await {
        Ok(status) => status,
        Err(e) => {
            let status = e
                .downcast_ref::<strata::Error>()
                .map_or(ExitStatus::Failure, ExitStatus::from_error);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            status
        }
    };
    std::process::exit(status.code());
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(env) = &cli.env {
        config.environment = env.clone();
    }
    Ok(config)
}

async fn run() -> Result<ExitStatus> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let url = config
        .database
        .url
        .clone()
        .context("no database URL; set database.url, --database-url or STRATA_DATABASE_URL")?;
    let backend = SqlBackend::new(url, config.database.ledger_table.clone())?;
    let mut migrator = Migrator::new(backend, config);

    let status = match cli.command {
        Commands::Migrate {
            dry_run,
            force,
            seed,
        } => {
            let params = MigrateParams {
                dry_run,
                force,
                seed: seed.params(),
            };
            let report = migrator.migrate(&params).await?;
            render::print_report(&report);
            report.exit_status()
        }
        Commands::Fresh {
            dry_run,
            force,
            yes,
            seed,
        } => {
            let params = FreshParams {
                dry_run,
                force,
                yes,
                seed: seed.params(),
            };
            let report = migrator.fresh(&params).await?;
            render::print_report(&report);
            report.exit_status()
        }
        Commands::Reset {
            dry_run,
            force,
            yes,
        } => {
            let params = ResetParams {
                dry_run,
                force,
                yes,
            };
            let report = migrator.reset(&params).await?;
            render::print_report(&report);
            report.exit_status()
        }
        Commands::Refresh { force, yes, seed } => {
            let params = RefreshParams {
                force,
                yes,
                seed: seed.params(),
            };
            let report = migrator.refresh(&params).await?;
            render::print_report(&report);
            report.exit_status()
        }
        Commands::Rollback {
            batch,
            take,
            dry_run,
            force,
            yes,
        } => {
            let params = RollbackParams {
                batch,
                take,
                dry_run,
                force,
                yes,
            };
            let report = migrator.rollback(&params).await?;
            render::print_report(&report);
            report.exit_status()
        }
        Commands::Status { json } => {
            let status = migrator.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                render::print_status(&status);
            }
            ExitStatus::Success
        }
        Commands::Init => {
            match migrator.init().await? {
                Initialized::Created => println!(
                    "{} Created ledger table {}",
                    "✓".green(),
                    migrator.backend().table().cyan()
                ),
                Initialized::AlreadyExists => println!(
                    "{} Ledger table {} already exists",
                    "○".dimmed(),
                    migrator.backend().table().cyan()
                ),
            }
            ExitStatus::Success
        }
        Commands::DatabaseCreate => {
            let name = migrator.backend().database_name();
            if migrator.database_create().await? {
                println!("{} Created database {}", "✓".green(), name.yellow());
            } else {
                println!("{} Database {} already exists", "○".dimmed(), name.yellow());
            }
            ExitStatus::Success
        }
        Commands::DatabaseDrop { force, yes } => {
            let name = migrator.backend().database_name();
            if migrator.database_drop(force, yes).await? {
                println!("{} Dropped database {}", "✓".green(), name.yellow());
            } else {
                println!("{} Database {} does not exist", "○".dimmed(), name.yellow());
            }
            ExitStatus::Success
        }
        Commands::DatabaseShow { json } => {
            let info = migrator.database_show().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                render::print_database(&info);
            }
            ExitStatus::Success
        }
    };

    migrator.into_backend().close().await;
    Ok(status)
}
