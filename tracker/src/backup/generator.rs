//! Snapshot generation: concurrent extraction of every collection.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::artifact::SnapshotArtifact;
use super::order::snapshot_collections;
use super::progress::ProgressSpan;
use crate::config::BackupSettings;
use crate::database::schema::FetchMode;
use crate::database::{Collection, Database, EntityKind, Filter, Page, Record};

struct FetchedCollection {
    kind: EntityKind,
    records: Vec<Value>,
    children: Option<(EntityKind, u64)>,
}

#[derive(Clone)]
pub struct SnapshotGenerator {
    database: Arc<Database>,
    settings: BackupSettings,
}

impl SnapshotGenerator {
    pub fn new(database: Arc<Database>, settings: BackupSettings) -> Self {
        Self { database, settings }
    }

    /// Capture every collection into one artifact. The first failing
    /// collection aborts the whole generation.
    #[instrument(skip(self, span))]
    pub async fn generate(&self, span: &ProgressSpan) -> Result<SnapshotArtifact> {
        let captured_at = Utc::now();
        let collections: Vec<EntityKind> = snapshot_collections().collect();
        let total = collections.len();
        let concurrency = self.database.fetch_concurrency();
        info!(
            "Generating snapshot of {} collections, {} fetched at a time",
            total, concurrency
        );

        // Each fetch holds one pooled connection until its last page
        let mut pending = stream::iter(collections)
            .map(|kind| async move {
                self.fetch_collection(kind)
                    .await
                    .with_context(|| format!("Failed to fetch collection {}", kind))
            })
            .buffer_unordered(concurrency);

        let mut artifact = SnapshotArtifact::new(captured_at);
        let mut done = 0;
        while let Some(fetched) = pending.next().await {
            let fetched = fetched?;
            done += 1;
            span.report(
                done,
                total,
                format!(
                    "Fetched {} ({} records), {}/{} collections",
                    fetched.kind,
                    fetched.records.len(),
                    done,
                    total
                ),
            );
            if let Some((child, count)) = fetched.children {
                artifact.set_count(child, count);
            }
            artifact.insert_collection(fetched.kind, fetched.records);
        }

        info!(
            "Snapshot captured at {}: {} records",
            captured_at,
            artifact.total_records()
        );
        Ok(artifact)
    }

    async fn fetch_collection(&self, kind: EntityKind) -> Result<FetchedCollection> {
        let mut conn = self.database.acquire().await?;
        let def = kind.def();

        let records = match def.fetch {
            FetchMode::Single => {
                Collection::new(&mut *conn, kind)
                    .find_many(&Filter::All, None)
                    .await?
            }
            FetchMode::Paged => self.fetch_paged(&mut *conn, kind).await?,
        };

        let Some(link) = def.children else {
            debug!("Fetched {} {} records", records.len(), kind);
            return Ok(FetchedCollection {
                kind,
                records: records.into_iter().map(Value::Object).collect(),
                children: None,
            });
        };

        let parent_fk = link
            .kind
            .def()
            .parent
            .map(|p| p.fk)
            .with_context(|| format!("{} declares no parent link", link.kind))?;
        let children = Collection::new(&mut *conn, link.kind)
            .find_many(&Filter::All, None)
            .await?;
        let child_count = children.len() as u64;

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for child in children {
            if let Some(Value::String(parent_id)) = child.get(parent_fk) {
                grouped
                    .entry(parent_id.clone())
                    .or_default()
                    .push(Value::Object(child));
            }
        }

        let records = records
            .into_iter()
            .map(|mut record| {
                let nested = record
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|id| grouped.remove(id))
                    .unwrap_or_default();
                record.insert(link.field.to_string(), Value::Array(nested));
                Value::Object(record)
            })
            .collect::<Vec<_>>();

        debug!(
            "Fetched {} {} records with {} {}",
            records.len(),
            kind,
            child_count,
            link.kind
        );
        Ok(FetchedCollection {
            kind,
            records,
            children: Some((link.kind, child_count)),
        })
    }

    /// Pages in increasing offset order with a pause between pages
    async fn fetch_paged(
        &self,
        conn: &mut sqlx::SqliteConnection,
        kind: EntityKind,
    ) -> Result<Vec<Record>> {
        let limit = self.settings.page_size;
        let mut offset = 0u64;
        let mut records = Vec::new();

        loop {
            let page = Collection::new(&mut *conn, kind)
                .find_many(&Filter::All, Some(Page { limit, offset }))
                .await?;
            let fetched = page.len();
            records.extend(page);
            debug!("{} page at offset {}: {} records", kind, offset, fetched);

            if fetched < limit as usize {
                break;
            }
            offset += fetched as u64;
            tokio::time::sleep(self.settings.page_pause()).await;
        }

        Ok(records)
    }
}
