use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::constants::snapshot::{FILE_EXTENSION, FILE_PREFIX, FORMAT_VERSION};
use crate::database::{BackupCatalogRecord, EntityKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    /// Records per collection key, embedded child collections included
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
}

/// One complete export of the operational store.
///
/// Records are kept as raw JSON values: restore must tolerate malformed
/// entries record by record instead of rejecting the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArtifact {
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<Value>>,
}

impl SnapshotArtifact {
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                version: FORMAT_VERSION,
                captured_at,
                counts: BTreeMap::new(),
            },
            data: BTreeMap::new(),
        }
    }

    pub fn insert_collection(&mut self, kind: EntityKind, records: Vec<Value>) {
        self.metadata
            .counts
            .insert(kind.table().to_string(), records.len() as u64);
        self.data.insert(kind.table().to_string(), records);
    }

    pub fn set_count(&mut self, kind: EntityKind, count: u64) {
        self.metadata.counts.insert(kind.table().to_string(), count);
    }

    pub fn collection(&self, kind: EntityKind) -> Option<&[Value]> {
        self.data.get(kind.table()).map(Vec::as_slice)
    }

    pub fn expected_count(&self, kind: EntityKind) -> Option<u64> {
        self.metadata.counts.get(kind.table()).copied()
    }

    pub fn total_records(&self) -> u64 {
        self.metadata.counts.values().sum()
    }

    /// `backup_<YYYYMMDD_HHMMSS>.json.gz` from the capture timestamp
    pub fn file_name(&self) -> String {
        file_name_for(self.metadata.captured_at)
    }
}

pub fn file_name_for(captured_at: DateTime<Utc>) -> String {
    format!(
        "{}{}.{}",
        FILE_PREFIX,
        captured_at.format("%Y%m%d_%H%M%S"),
        FILE_EXTENSION
    )
}

/// Attached to the final event of a snapshot stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub id: String,
    pub file_name: String,
    pub file_key: String,
    pub size: i64,
    pub created_by: String,
    pub captured_at: DateTime<Utc>,
    pub total_records: u64,
    pub counts: BTreeMap<String, u64>,
}

impl ArtifactSummary {
    pub fn new(record: &BackupCatalogRecord, metadata: &SnapshotMetadata) -> Self {
        Self {
            id: record.id.clone(),
            file_name: record.file_name.clone(),
            file_key: record.file_key.clone(),
            size: record.size,
            created_by: record.created_by.clone(),
            captured_at: metadata.captured_at,
            total_records: metadata.counts.values().sum(),
            counts: metadata.counts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_file_name_uses_capture_timestamp() {
        let captured_at = Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(file_name_for(captured_at), "backup_20260307_140509.json.gz");
    }

    #[test]
    fn test_insert_collection_records_count() {
        let mut artifact = SnapshotArtifact::new(Utc::now());
        artifact.insert_collection(EntityKind::Tag, vec![json!({"id": "t1"}), json!({"id": "t2"})]);
        artifact.set_count(EntityKind::UserDevice, 3);

        assert_eq!(artifact.expected_count(EntityKind::Tag), Some(2));
        assert_eq!(artifact.expected_count(EntityKind::UserDevice), Some(3));
        assert_eq!(artifact.total_records(), 5);
        assert!(artifact.collection(EntityKind::User).is_none());
    }
}
