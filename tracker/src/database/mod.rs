//! Database layer for the tracker.
//!
//! This module provides SQLite persistence for:
//! - The operational store (35 entity tables described in `schema`)
//! - The backup catalog (`backup_catalog`, application metadata)
//!
//! The module is organized into submodules:
//! - `schema` - Static entity definitions and DDL generation
//! - `collection` - Generic per-entity store handle and transaction scope
//! - `catalog` - Backup catalog CRUD operations
//! - `records` - Catalog record types

mod catalog;
pub mod collection;
mod records;
pub mod schema;

pub use collection::{Collection, Filter, Page, Record, StoreTx};
pub use records::*;
pub use schema::EntityKind;

use anyhow::Result;
use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::constants::defaults;
use crate::errors::RestoreError;

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Raw pool, for catalog queries and integration tests
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("=== Starting database initialization ===");
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                info!("Ensuring parent directory exists: {:?}", parent);
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!("FAILED to create parent directory {:?}: {}", parent, e);
                    return Err(e.into());
                }
            }
        }

        let database_url = format!("sqlite:{}", database_path);
        let options = SqliteConnectOptions::from_str(&database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        info!("Connecting to database with URL: {}", database_url);
        let pool = match SqlitePoolOptions::new()
            .max_connections(defaults::MAX_DB_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECONDS))
            .connect_with(options)
            .await
        {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Database path: {}", database_path);
                return Err(e.into());
            }
        };

        let database = Self { pool };

        info!("Starting table initialization...");
        match database.initialize_tables().await {
            Ok(_) => info!("Database tables initialized successfully"),
            Err(e) => {
                error!("CRITICAL: Database table initialization failed: {}", e);
                return Err(e);
            }
        }

        info!("Testing database connectivity...");
        match database.test_database().await {
            Ok(_) => info!("Database test successful"),
            Err(e) => {
                error!("Database test failed: {}", e);
                return Err(e);
            }
        }

        info!("=== Database initialization completed successfully ===");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        for (step, kind) in EntityKind::ALL.iter().enumerate() {
            let def = kind.def();
            let table_sql = def.create_table_sql();
            debug!("Step {}: Creating {} table...", step + 1, def.table);

            if let Err(e) = sqlx::query(&table_sql).execute(&self.pool).await {
                error!("FAILED to create {} table: {}", def.table, e);
                error!("SQL was: {}", table_sql);
                return Err(e.into());
            }

            for index_sql in def.index_sql() {
                if let Err(e) = sqlx::query(&index_sql).execute(&self.pool).await {
                    error!("FAILED to create index on {}: {}", def.table, e);
                    return Err(e.into());
                }
            }
        }
        info!("{} entity tables created", EntityKind::ALL.len());

        let catalog_table_sql = r#"
            CREATE TABLE IF NOT EXISTS backup_catalog (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_key TEXT UNIQUE NOT NULL,
                size INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(catalog_table_sql).execute(&self.pool).await {
            error!("FAILED to create backup_catalog table: {}", e);
            return Err(e.into());
        }

        let catalog_index_sql =
            "CREATE INDEX IF NOT EXISTS idx_backup_catalog_created ON backup_catalog(created_at DESC)";
        if let Err(e) = sqlx::query(catalog_index_sql).execute(&self.pool).await {
            error!("FAILED to create backup_catalog index: {}", e);
            return Err(e.into());
        }
        info!("backup_catalog table created");

        info!("All database tables and indexes created successfully");
        Ok(())
    }

    async fn test_database(&self) -> Result<()> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM backup_catalog")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        debug!("backup_catalog holds {} entries", count);
        Ok(())
    }

    /// Collection fetches allowed to hold a pooled connection at once; one
    /// connection stays free for catalog and web queries.
    pub fn fetch_concurrency(&self) -> usize {
        let max = self.pool.options().get_max_connections() as usize;
        max.saturating_sub(1).max(1)
    }

    /// Dedicated pooled connection for read-only collection fetches
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn begin(&self) -> Result<StoreTx> {
        let tx = self.pool.begin().await?;
        Ok(StoreTx::new(tx))
    }

    /// Run `work` inside one transaction, committing only if it succeeds
    /// within `timeout`. On error or timeout everything is rolled back.
    pub async fn run_in_transaction<T, F>(&self, timeout: Duration, work: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut StoreTx) -> BoxFuture<'t, Result<T>> + Send,
    {
        let mut tx = self.begin().await?;

        let outcome = tokio::time::timeout(timeout, work(&mut tx)).await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!("Transaction work failed, rolling back: {}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
            Err(_) => {
                let minutes = timeout.as_secs() / 60;
                error!("Transaction exceeded {}s, rolling back", timeout.as_secs());
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(RestoreError::TransactionTimeout { minutes }.into())
            }
        }
    }
}
