//! Database record types for application metadata.
//!
//! Entity rows of the operational store are untyped (`collection::Record`);
//! only the backup catalog has a typed record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored snapshot artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCatalogRecord {
    pub id: String,
    pub file_name: String,
    /// Key returned by blob storage on upload
    pub file_key: String,
    pub size: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
