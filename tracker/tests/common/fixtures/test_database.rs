//! Test database utilities backed by a temporary SQLite file
//!
//! An in-memory database would give every pooled connection its own empty
//! store, so each test gets a file inside its own `TempDir`.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

use tracker::database::{Collection, EntityKind, Filter, Record};
use tracker::Database;

pub struct TestDatabase {
    // Keeps the directory alive as long as the database
    dir: TempDir,
    database: Arc<Database>,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("tracker.db");
        let database = Database::new(path.to_str().context("temp path is not UTF-8")?).await?;
        Ok(Self {
            dir,
            database: Arc::new(database),
        })
    }

    pub fn database(&self) -> Arc<Database> {
        self.database.clone()
    }

    /// Scratch directory next to the database file, e.g. for local blobs
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Insert raw rows in one transaction, in the given order
    pub async fn insert(&self, kind: EntityKind, records: Vec<Value>) -> Result<()> {
        let mut tx = self.database.begin().await?;
        for record in records {
            let Value::Object(record) = record else {
                bail!("{} fixture row is not an object", kind);
            };
            tx.collection(kind).create(&record).await?;
        }
        tx.commit().await
    }

    pub async fn rows(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let mut conn = self.database.acquire().await?;
        Collection::new(&mut *conn, kind)
            .find_many(&Filter::All, None)
            .await
    }

    pub async fn row(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let mut conn = self.database.acquire().await?;
        Collection::new(&mut *conn, kind).find_by_id(id).await
    }

    pub async fn count(&self, kind: EntityKind) -> Result<u64> {
        let mut conn = self.database.acquire().await?;
        Collection::new(&mut *conn, kind).count().await
    }

    pub async fn total_rows(&self) -> Result<u64> {
        let mut total = 0;
        for kind in EntityKind::ALL {
            total += self.count(kind).await?;
        }
        Ok(total)
    }

    /// Run raw SQL against the store, e.g. to install a trigger
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(self.database.pool()).await?;
        Ok(())
    }

    /// Rows violating a foreign key, as reported by SQLite
    pub async fn foreign_key_violations(&self) -> Result<usize> {
        let rows = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(self.database.pool())
            .await?;
        Ok(rows.len())
    }
}
