//! SQL backend against SQLite through the sqlx `Any` driver.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use strata::backend::{DatabaseLifecycle, SqlBackend};
use strata::config::Config;
use strata::ledger::{Initialized, Ledger};
use strata::runner::{ItemKind, MigrateParams, Migrator, RollbackParams};
use strata::script::{Executor, Statement};
use strata::Error;

fn memory_backend() -> SqlBackend {
    SqlBackend::new("sqlite::memory:", "migrations").unwrap()
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let mut backend = memory_backend();

    assert!(!backend.exists().await.unwrap());
    assert_eq!(backend.initialize().await.unwrap(), Initialized::Created);
    assert!(backend.exists().await.unwrap());
    assert_eq!(
        backend.initialize().await.unwrap(),
        Initialized::AlreadyExists
    );
}

#[tokio::test]
async fn test_append_read_remove() {
    let mut backend = memory_backend();
    backend.initialize().await.unwrap();

    assert_eq!(backend.max_batch().await.unwrap(), None);
    assert!(backend.read_all().await.unwrap().is_empty());

    assert!(backend.append("001_init", 0).await.unwrap());
    assert!(backend.append("002_add_col", 1).await.unwrap());
    assert!(!backend.append("001_init", 5).await.unwrap());

    let snapshot = backend.read_all().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("001_init"), Some(0));
    assert_eq!(snapshot.get("002_add_col"), Some(1));
    assert_eq!(backend.max_batch().await.unwrap(), Some(1));

    assert!(backend.remove("002_add_col").await.unwrap());
    assert!(!backend.remove("002_add_col").await.unwrap());
    assert_eq!(backend.max_batch().await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_custom_table_name() {
    let mut backend = SqlBackend::new("sqlite::memory:", "schema_history").unwrap();
    backend.initialize().await.unwrap();
    backend.append("a", 0).await.unwrap();

    backend
        .execute(&Statement::new("SELECT migration FROM schema_history"))
        .await
        .unwrap();

    assert!(matches!(
        SqlBackend::new("sqlite::memory:", "bad; DROP TABLE x"),
        Err(Error::InvalidTableName(_))
    ));
}

#[tokio::test]
async fn test_execute_reports_errors() {
    let mut backend = memory_backend();

    backend
        .execute(&Statement::new("CREATE TABLE users (id INTEGER PRIMARY KEY)"))
        .await
        .unwrap();
    let err = backend
        .execute(&Statement::new("INSERT INTO nowhere VALUES (1)"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nowhere"));
}

#[tokio::test]
async fn test_database_lifecycle_on_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let url = format!("sqlite://{}", path.display());
    let mut backend = SqlBackend::new(url, "migrations").unwrap();

    assert!(!backend.database_exists().await.unwrap());
    assert!(backend.create_database(true).await.unwrap());
    assert!(path.exists());
    assert!(!backend.create_database(true).await.unwrap());
    assert!(matches!(
        backend.create_database(false).await,
        Err(Error::DatabaseExists(_))
    ));

    backend.initialize().await.unwrap();
    backend.append("a", 0).await.unwrap();

    assert!(backend.drop_database(true).await.unwrap());
    assert!(!path.exists());
    assert!(!backend.drop_database(true).await.unwrap());
    assert!(matches!(
        backend.drop_database(false).await,
        Err(Error::DatabaseMissing(_))
    ));
}

#[tokio::test]
async fn test_migrate_and_rollback_end_to_end() {
    let dir = TempDir::new().unwrap();
    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("001_users.sql"),
        "-- up\n\
         CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
         INSERT INTO users (name) VALUES ('semi;colon');\n\
         -- down\n\
         DROP TABLE users;\n",
    )
    .unwrap();
    fs::write(
        migrations.join("002_posts.sql"),
        "-- up\nCREATE TABLE posts (id INTEGER PRIMARY KEY);\n-- down\nDROP TABLE posts;\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.migrations.path = migrations;

    let mut m = Migrator::new(memory_backend(), config);
    m.init().await.unwrap();

    let report = m.migrate(&MigrateParams::default()).await.unwrap();
    assert!(!report.has_failures(), "{:?}", report.items);
    assert_eq!(report.count(ItemKind::Up), 2);

    let status = m.status().await.unwrap();
    assert_eq!(status.pending(), 0);
    assert_eq!(status.next_batch, 1);

    let report = m
        .rollback(&RollbackParams {
            batch: Some(0),
            yes: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let rolled: Vec<_> = report.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(rolled, vec!["002_posts", "001_users"]);
    assert!(!report.has_failures(), "{:?}", report.items);

    let mut backend = m.into_backend();
    assert!(backend.read_all().await.unwrap().is_empty());
    let err = backend
        .execute(&Statement::new("SELECT * FROM users"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("users"));
}

#[tokio::test]
async fn test_show_on_freshly_initialized_database() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());
    let mut m = Migrator::new(SqlBackend::new(url, "migrations").unwrap(), Config::default());

    m.database_create().await.unwrap();
    m.init().await.unwrap();
    let info = m.database_show().await.unwrap();

    assert!(info.exists && info.ledger);
    assert_eq!(info.migrations, 0);
    assert_eq!(info.last_batch, None);
}

#[tokio::test]
async fn test_corrupt_database_is_not_reported_as_missing_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    fs::write(&path, vec![b'x'; 4096]).unwrap();
    let url = format!("sqlite://{}", path.display());

    let mut backend = SqlBackend::new(url.clone(), "migrations").unwrap();
    let err = backend.exists().await.unwrap_err();
    assert!(matches!(err, Error::Database(_)), "{:?}", err);

    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    let mut config = Config::default();
    config.migrations.path = migrations;
    let mut m = Migrator::new(SqlBackend::new(url, "migrations").unwrap(), config);
    let err = m.migrate(&MigrateParams::default()).await.unwrap_err();
    assert!(!matches!(err, Error::LedgerUnavailable { .. }), "{}", err);
}
