//! Terminal rendering of reports.

use colored::*;

use crate::runner::{DatabaseInfo, ItemKind, ItemReport, ItemStatus, Report, StatusReport};

fn kind_label(kind: ItemKind) -> ColoredString {
    match kind {
        ItemKind::Up => "↑".cyan(),
        ItemKind::Down => "↓".yellow(),
        ItemKind::Seed => "●".magenta(),
    }
}

fn item_line(item: &ItemReport) -> String {
    let batch = item
        .batch
        .map(|b| format!("[{}]", b))
        .unwrap_or_else(|| "[seed]".to_string());
    let status = match &item.status {
        ItemStatus::Done => "DONE".green().bold(),
        ItemStatus::Failed(_) => "FAIL".red().bold(),
        ItemStatus::Rendered(_) => "DRY".blue().bold(),
    };
    format!(
        "  {} {} {} {}",
        kind_label(item.kind),
        batch.dimmed(),
        item.name,
        status
    )
}

/// Print one line per item, dry-run statements, failures and a summary.
pub fn print_report(report: &Report) {
    let title = if report.dry_run {
        format!("{} (dry-run)", report.operation)
    } else {
        report.operation.to_string()
    };
    println!("{}", title.cyan().bold());

    if report.items.is_empty() {
        println!("  {}", "Nothing to do.".green());
        return;
    }

    for item in &report.items {
        println!("{}", item_line(item));
        match &item.status {
            ItemStatus::Failed(message) => println!("      {}", message.red()),
            ItemStatus::Rendered(statements) => {
                for sql in statements {
                    println!("      {}", sql.dimmed());
                }
            }
            ItemStatus::Done => {}
        }
    }

    let failed = report.failed().count();
    println!();
    if failed == 0 {
        let verb = if report.dry_run { "planned" } else { "completed" };
        println!(
            "{}",
            format!("✓ {} item(s) {}", report.items.len(), verb)
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ {} of {} item(s) failed", failed, report.items.len())
                .red()
                .bold()
        );
    }
}

pub fn print_status(status: &StatusReport) {
    println!("{}", "📋 Migration Status".cyan().bold());
    println!();

    if status.migrations.is_empty() {
        println!("  {} No migration files found", "○".dimmed());
    }
    for row in &status.migrations {
        match row.batch {
            Some(batch) => println!(
                "  {} {} {}",
                "✓".green(),
                format!("[{}]", batch).dimmed(),
                row.name
            ),
            None => println!("  {} {} {}", "○".yellow(), "[pending]".yellow(), row.name),
        }
    }
    for name in &status.missing {
        println!("  {} {} {}", "!".red(), "[missing file]".red(), name);
    }

    println!();
    println!(
        "  {} pending, next batch {}",
        status.pending().to_string().yellow(),
        status.next_batch.to_string().cyan()
    );
}

pub fn print_database(info: &DatabaseInfo) {
    println!("  Database:   {}", info.name.yellow());
    let exists = if info.exists { "yes".green() } else { "no".red() };
    println!("  Exists:     {}", exists);
    if info.exists {
        let ledger = if info.ledger {
            "initialized".green()
        } else {
            "missing".yellow()
        };
        println!("  Ledger:     {}", ledger);
        println!("  Migrations: {}", info.migrations);
        let last = info
            .last_batch
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  Last batch: {}", last.cyan());
    }
}
