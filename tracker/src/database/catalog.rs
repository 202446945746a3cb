//! Backup catalog database operations.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error};

use super::records::BackupCatalogRecord;
use super::Database;

impl Database {
    pub async fn insert_catalog_record(&self, record: &BackupCatalogRecord) -> Result<()> {
        debug!("Storing catalog record: {} ({})", record.id, record.file_key);

        match sqlx::query(
            r#"
            INSERT INTO backup_catalog (id, file_name, file_key, size, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.file_name)
        .bind(&record.file_key)
        .bind(record.size)
        .bind(&record.created_by)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        {
            Ok(_) => {
                debug!("Catalog record stored: {}", record.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to store catalog record {}: {}", record.id, e);
                Err(e.into())
            }
        }
    }

    pub async fn get_catalog_record(&self, id: &str) -> Result<Option<BackupCatalogRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_name, file_key, size, created_by, created_at
            FROM backup_catalog
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| catalog_record_from_row(&row)).transpose()
    }

    pub async fn get_catalog_record_by_key(
        &self,
        file_key: &str,
    ) -> Result<Option<BackupCatalogRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_name, file_key, size, created_by, created_at
            FROM backup_catalog
            WHERE file_key = ?
            "#,
        )
        .bind(file_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| catalog_record_from_row(&row)).transpose()
    }

    /// Resolve a caller-supplied key against record id first, then storage key
    pub async fn find_catalog_record(&self, key: &str) -> Result<Option<BackupCatalogRecord>> {
        if let Some(record) = self.get_catalog_record(key).await? {
            return Ok(Some(record));
        }
        self.get_catalog_record_by_key(key).await
    }

    pub async fn list_catalog_records(&self) -> Result<Vec<BackupCatalogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, file_key, size, created_by, created_at
            FROM backup_catalog
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(catalog_record_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} catalog records", records.len());
        Ok(records)
    }

    pub async fn delete_catalog_record(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup_catalog WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn catalog_record_from_row(row: &SqliteRow) -> Result<BackupCatalogRecord> {
    Ok(BackupCatalogRecord {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        file_key: row.try_get("file_key")?,
        size: row.try_get("size")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}
