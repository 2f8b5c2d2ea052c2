//! sqlx-backed backend.

use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::error::DatabaseError;
use sqlx::migrate::MigrateDatabase;
use sqlx::{Any, AnyPool, Executor as _, Row};
use tracing::{debug, info};

use super::{DatabaseLifecycle, is_valid_table_name};
use crate::error::{Error, ExecutionError, Result};
use crate::ledger::{Initialized, Ledger, LedgerSnapshot};
use crate::script::{Executor, Statement};

/// Ledger, executor and lifecycle over one database URL.
///
/// The pool is opened lazily and holds a single connection, so statements run
/// strictly in order and `sqlite::memory:` databases stay alive between calls.
pub struct SqlBackend {
    url: String,
    table: String,
    pool: Option<AnyPool>,
}

impl SqlBackend {
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(Error::InvalidTableName(table));
        }
        install_default_drivers();
        Ok(Self {
            url: url.into(),
            table,
            pool: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn pool(&mut self) -> Result<AnyPool> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        debug!(url = %redact(&self.url), "connecting");
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&self.url)
            .await?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool; the next call reconnects.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }
}

impl Ledger for SqlBackend {
    async fn exists(&mut self) -> Result<bool> {
        let pool = self.pool().await?;
        let probe = format!("SELECT COUNT(*) FROM {}", self.table);
        match sqlx::query(&probe).fetch_one(&pool).await {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if is_undefined_table(e.as_ref()) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn initialize(&mut self) -> Result<Initialized> {
        if self.exists().await? {
            return Ok(Initialized::AlreadyExists);
        }
        let pool = self.pool().await?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (migration VARCHAR(100) NOT NULL UNIQUE, batch INT NOT NULL)",
            self.table
        );
        pool.execute(ddl.as_str()).await?;
        info!(table = %self.table, "ledger created");
        Ok(Initialized::Created)
    }

    async fn read_all(&mut self) -> Result<LedgerSnapshot> {
        let pool = self.pool().await?;
        let sql = format!(
            "SELECT migration, CAST(batch AS BIGINT) AS batch FROM {}",
            self.table
        );
        let rows = sqlx::query(&sql).fetch_all(&pool).await?;

        let mut snapshot = LedgerSnapshot::new();
        for row in rows {
            let name: String = row.try_get("migration")?;
            let batch: i64 = row.try_get("batch")?;
            snapshot.insert(name, batch);
        }
        Ok(snapshot)
    }

    async fn append(&mut self, name: &str, batch: i64) -> Result<bool> {
        let pool = self.pool().await?;
        let sql = format!(
            "INSERT INTO {} (migration, batch) VALUES ($1, $2)",
            self.table
        );
        match sqlx::query(&sql).bind(name).bind(batch).execute(&pool).await {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(migration = name, "duplicate ledger entry");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&mut self, name: &str) -> Result<bool> {
        let pool = self.pool().await?;
        let sql = format!("DELETE FROM {} WHERE migration = $1", self.table);
        let done = sqlx::query(&sql).bind(name).execute(&pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn max_batch(&mut self) -> Result<Option<i64>> {
        let pool = self.pool().await?;
        // The Any driver cannot decode a NULL aggregate, so an empty ledger reads as -1.
        let sql = format!(
            "SELECT CAST(COALESCE(MAX(batch), -1) AS BIGINT) AS max_batch FROM {}",
            self.table
        );
        let row = sqlx::query(&sql).fetch_one(&pool).await?;
        let max: i64 = row.try_get("max_batch")?;
        Ok((max >= 0).then_some(max))
    }
}

impl Executor for SqlBackend {
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<(), ExecutionError> {
        let pool = self
            .pool()
            .await
            .map_err(|e| ExecutionError::new(e.to_string()))?;
        pool.execute(statement.sql()).await?;
        Ok(())
    }
}

impl DatabaseLifecycle for SqlBackend {
    fn database_name(&self) -> String {
        database_name(&self.url)
    }

    async fn database_exists(&mut self) -> Result<bool> {
        Ok(Any::database_exists(&self.url).await?)
    }

    async fn create_database(&mut self, if_not_exists: bool) -> Result<bool> {
        if Any::database_exists(&self.url).await? {
            if if_not_exists {
                return Ok(false);
            }
            return Err(Error::DatabaseExists(self.database_name()));
        }
        Any::create_database(&self.url).await?;
        info!(database = %self.database_name(), "database created");
        Ok(true)
    }

    async fn drop_database(&mut self, if_exists: bool) -> Result<bool> {
        self.close().await;
        if !Any::database_exists(&self.url).await? {
            if if_exists {
                return Ok(false);
            }
            return Err(Error::DatabaseMissing(self.database_name()));
        }
        Any::drop_database(&self.url).await?;
        info!(database = %self.database_name(), "database dropped");
        Ok(true)
    }
}

/// `42P01` on PostgreSQL, `no such table` on SQLite. Anything else is a real
/// storage failure.
fn is_undefined_table(err: &dyn DatabaseError) -> bool {
    err.code().as_deref() == Some("42P01") || err.message().starts_with("no such table")
}

/// Database name from a URL: the path without query string or leading slash.
pub fn database_name(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.split_once("://") {
        Some((scheme, rest)) if scheme.starts_with("sqlite") => rest.to_string(),
        Some((_, rest)) => rest
            .split_once('/')
            .map(|(_, db)| db.to_string())
            .unwrap_or_default(),
        None => without_query
            .strip_prefix("sqlite:")
            .unwrap_or(without_query)
            .to_string(),
    }
}

/// Hide the password part of a URL for logs.
fn redact(url: &str) -> String {
    match (url.split_once("://"), url.rfind('@')) {
        (Some((scheme, rest)), Some(_)) => {
            let (creds, host) = rest.rsplit_once('@').unwrap_or(("", rest));
            let user = creds.split(':').next().unwrap_or("");
            format!("{}://{}:***@{}", scheme, user, host)
        }
        _ => url.to_string(),
    }
}
