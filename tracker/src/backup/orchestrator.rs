//! Restore orchestration.
//!
//! Cleanup, Recreate and Validate run strictly in sequence inside one store
//! transaction. Record-level problems become session warnings and never
//! escape; only structural failures abort (and roll back) the restore.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::artifact::SnapshotArtifact;
use super::order::{junctions, DELETION_ORDER, RECREATION_ORDER, SPOT_CHECKS};
use super::progress::ProgressSpan;
use super::session::{RestorePhase, RestoreSession, RestoreSummary};
use super::transform::{
    reference_id, strategy, transform, transform_child, DeferredRelation, ResolveContext,
    Strategy, Transformed,
};
use crate::config::BackupSettings;
use crate::constants::snapshot::FORMAT_VERSION;
use crate::database::collection::is_unique_violation;
use crate::database::schema::Identity;
use crate::database::{Database, EntityKind, Filter, StoreTx};
use crate::errors::{ArtifactError, RestoreError};

#[derive(Clone)]
pub struct RestoreOrchestrator {
    database: Arc<Database>,
    settings: BackupSettings,
}

impl RestoreOrchestrator {
    pub fn new(database: Arc<Database>, settings: BackupSettings) -> Self {
        Self { database, settings }
    }

    /// Replace the whole store content with `artifact`, all or nothing
    #[instrument(skip_all, fields(captured_at = %artifact.metadata.captured_at))]
    pub async fn restore(
        &self,
        artifact: Arc<SnapshotArtifact>,
        span: ProgressSpan,
    ) -> Result<RestoreSummary> {
        if artifact.metadata.version > FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: artifact.metadata.version,
                supported: FORMAT_VERSION,
            }
            .into());
        }

        info!(
            "Starting restore of snapshot captured at {} ({} records)",
            artifact.metadata.captured_at,
            artifact.total_records()
        );
        let watchdog = spawn_watchdog(self.settings.watchdog_threshold());
        let progress_every = self.settings.progress_every_records.max(1) as usize;

        let result = self
            .database
            .run_in_transaction(self.settings.restore_timeout(), move |tx| {
                Box::pin(async move {
                    let mut session = RestoreSession::new();
                    let outcome =
                        run_phases(tx, &artifact, &mut session, &span, progress_every).await;
                    match outcome {
                        Ok(()) => Ok(session.into_summary()),
                        Err(e) => {
                            error!("Restore failed in {:?} phase: {}", session.phase(), e);
                            session.fail();
                            Err(e)
                        }
                    }
                })
            })
            .await;

        watchdog.abort();

        if let Ok(summary) = &result {
            info!(
                "Restore committed: {} records restored, {} warnings, {}ms",
                summary.total_restored,
                summary.warnings.len(),
                summary.duration_ms
            );
        }
        result
    }

    /// Empty every entity table in its own transaction
    pub async fn cleanup_store(&self) -> Result<u64> {
        self.database
            .run_in_transaction(self.settings.restore_timeout(), |tx| {
                Box::pin(async move {
                    let mut session = RestoreSession::new();
                    session.advance(RestorePhase::Cleanup)?;
                    let deleted = cleanup(tx, &mut session, &ProgressSpan::silent()).await?;
                    session.advance(RestorePhase::Done)?;
                    Ok(deleted)
                })
            })
            .await
    }
}

fn spawn_watchdog(threshold: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        loop {
            tokio::time::sleep(threshold).await;
            warn!(
                "Restore still running after {}s, transaction remains open",
                started.elapsed().as_secs()
            );
        }
    })
}

async fn run_phases(
    tx: &mut StoreTx,
    artifact: &SnapshotArtifact,
    session: &mut RestoreSession,
    span: &ProgressSpan,
    progress_every: usize,
) -> Result<()> {
    session.advance(RestorePhase::Cleanup)?;
    let deleted = cleanup(tx, session, &span.slice(0, 20)).await?;
    info!("Cleanup removed {} rows", deleted);

    session.advance(RestorePhase::Recreate)?;
    let mut recreation = Recreation {
        tx: &mut *tx,
        session: &mut *session,
        ctx: ResolveContext::default(),
        pending: Vec::new(),
        progress_every,
    };
    recreation.run(artifact, &span.slice(20, 90)).await?;

    session.advance(RestorePhase::Validate)?;
    validate(tx, artifact, session, &span.slice(90, 100)).await?;

    session.advance(RestorePhase::Done)?;
    Ok(())
}

// ============================================================================
// Cleanup
// ============================================================================

async fn non_empty_tables(tx: &mut StoreTx) -> Result<Vec<EntityKind>> {
    let mut remaining = Vec::new();
    for kind in DELETION_ORDER {
        if tx.collection(kind).count().await? > 0 {
            remaining.push(kind);
        }
    }
    Ok(remaining)
}

async fn delete_pass(tx: &mut StoreTx, kinds: &[EntityKind], span: &ProgressSpan) -> u64 {
    let mut deleted = 0;
    for (i, kind) in kinds.iter().enumerate() {
        match tx.collection(*kind).delete_many(&Filter::All).await {
            Ok(count) => deleted += count,
            Err(e) => warn!("Could not empty {}: {}", kind, e),
        }
        span.report(i + 1, kinds.len(), format!("Cleared {}", kind));
    }
    deleted
}

async fn cleanup(
    tx: &mut StoreTx,
    session: &mut RestoreSession,
    span: &ProgressSpan,
) -> Result<u64> {
    span.enter("Clearing existing data");

    // Cyclic back-references would otherwise block deletion order
    for kind in DELETION_ORDER {
        tx.collection(kind).detach_references(true).await?;
    }

    let junction_kinds: Vec<EntityKind> = junctions().collect();
    let mut deleted = delete_pass(tx, &junction_kinds, &ProgressSpan::silent()).await;

    let junction_leftovers: Vec<EntityKind> = non_empty_tables(tx)
        .await?
        .into_iter()
        .filter(|kind| junction_kinds.contains(kind))
        .collect();
    if !junction_leftovers.is_empty() {
        warn!("Junction tables not empty after first delete: {:?}", junction_leftovers);
    }

    deleted += delete_pass(tx, &DELETION_ORDER, span).await;

    let remaining = non_empty_tables(tx).await?;
    if remaining.is_empty() {
        return Ok(deleted);
    }

    session.warn(format!(
        "Cleanup left rows in {}, running forced pass",
        join_kinds(&remaining)
    ));
    for kind in DELETION_ORDER {
        if let Err(e) = tx.collection(kind).detach_references(false).await {
            warn!("Could not detach references of {}: {}", kind, e);
        }
    }
    deleted += delete_pass(tx, &DELETION_ORDER, &ProgressSpan::silent()).await;

    let remaining = non_empty_tables(tx).await?;
    if !remaining.is_empty() {
        return Err(RestoreError::CleanupIncomplete {
            tables: remaining.iter().map(|k| k.table().to_string()).collect(),
        }
        .into());
    }
    Ok(deleted)
}

fn join_kinds(kinds: &[EntityKind]) -> String {
    kinds
        .iter()
        .map(|k| k.table())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Recreate
// ============================================================================

struct PendingPatch {
    owner: EntityKind,
    owner_id: String,
    field: &'static str,
    target: EntityKind,
    target_id: String,
}

struct Recreation<'a> {
    tx: &'a mut StoreTx,
    session: &'a mut RestoreSession,
    ctx: ResolveContext,
    pending: Vec<PendingPatch>,
    progress_every: usize,
}

impl Recreation<'_> {
    async fn run(&mut self, artifact: &SnapshotArtifact, span: &ProgressSpan) -> Result<()> {
        span.enter("Recreating records");

        for key in artifact.data.keys() {
            match EntityKind::from_key(key) {
                Some(kind) if !kind.def().is_embedded() => {}
                _ => self
                    .session
                    .warn(format!("Ignoring unknown collection '{}' in artifact", key)),
            }
        }

        let total = RECREATION_ORDER.len();
        for (i, kind) in RECREATION_ORDER.into_iter().enumerate() {
            if kind.def().is_embedded() {
                continue;
            }

            let Some(records) = artifact.collection(kind) else {
                self.session
                    .warn(format!("Collection {} missing from artifact", kind));
                continue;
            };

            if strategy(kind) == Strategy::Junction {
                self.prevalidate_junction(kind, records).await?;
            }

            let len = records.len();
            for (n, raw) in records.iter().enumerate() {
                self.restore_record(kind, raw).await;
                let done = n + 1;
                if done % self.progress_every == 0 && done < len {
                    span.report(
                        i * len + done,
                        total * len,
                        format!("Restoring {} ({}/{})", kind, done, len),
                    );
                }
            }

            let counters = self.session.counters(kind);
            debug!(
                "{}: {} restored, {} duplicates, {} skipped, {} failed",
                kind, counters.restored, counters.duplicates, counters.skipped, counters.failed
            );
            span.report(i + 1, total, format!("Restored {}", kind));
        }

        self.apply_pending_patches().await;
        Ok(())
    }

    /// Load which junction endpoints exist in the store, in batches
    async fn prevalidate_junction(&mut self, kind: EntityKind, records: &[Value]) -> Result<()> {
        let Identity::Compound { left, right } = kind.def().identity else {
            return Ok(());
        };

        for column in [left, right] {
            let Some(target) = kind.def().field(column).and_then(|f| f.reference) else {
                continue;
            };
            let ids: Vec<String> = records
                .iter()
                .filter_map(|raw| raw.get(column))
                .filter_map(|value| reference_id(value).ok().flatten())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let existing = self.tx.collection(target.target).existing_ids(&ids).await?;
            let missing = ids.len() - existing.len();
            if missing > 0 {
                warn!(
                    "{}: {} referenced {} identities do not exist, affected rows will be dropped",
                    kind, missing, target.target
                );
            }
            self.ctx.extend(target.target, existing);
        }
        Ok(())
    }

    async fn restore_record(&mut self, kind: EntityKind, raw: &Value) {
        let Some(written) = self.write_record(kind, raw, None).await else {
            return;
        };
        let Some(owner_id) = written.id().map(str::to_string) else {
            return;
        };

        for relation in written.deferred {
            match relation {
                DeferredRelation::BackReference {
                    field,
                    target,
                    target_id,
                } => self.patch_or_queue(kind, &owner_id, field, target, target_id).await,
                DeferredRelation::Children {
                    kind: child,
                    records,
                } => {
                    for child_raw in &records {
                        let Some(written_child) =
                            self.write_record(child, child_raw, Some(&owner_id)).await
                        else {
                            continue;
                        };
                        let Some(child_id) = written_child.id().map(str::to_string) else {
                            continue;
                        };
                        for nested in written_child.deferred {
                            if let DeferredRelation::BackReference {
                                field,
                                target,
                                target_id,
                            } = nested
                            {
                                self.patch_or_queue(child, &child_id, field, target, target_id)
                                    .await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Transform and write one record; `Some` only when it was written
    async fn write_record(
        &mut self,
        kind: EntityKind,
        raw: &Value,
        parent_id: Option<&str>,
    ) -> Option<Transformed> {
        let transformed = match parent_id {
            Some(parent_id) => transform_child(kind, raw, parent_id, &self.ctx),
            None => transform(kind, raw, &self.ctx),
        };

        let transformed = match transformed {
            Ok(transformed) => transformed,
            Err(issue) => {
                let label = record_label(kind, raw);
                if strategy(kind) == Strategy::Junction {
                    warn!("Dropping {}: {}", label, issue);
                    self.session.record_skipped(kind, None);
                } else {
                    self.session
                        .record_skipped(kind, Some(format!("Skipped {}: {}", label, issue)));
                }
                return None;
            }
        };

        if !transformed.omitted.is_empty() {
            debug!(
                "{}: omitted relations {:?}",
                record_label(kind, raw),
                transformed.omitted
            );
            self.session.add_omitted(transformed.omitted.len());
        }

        let write = self
            .tx
            .collection(kind)
            .write(&transformed.payload, transformed.policy)
            .await;

        match write {
            Ok(()) => {
                self.session.record_restored(kind);
                if let Some(id) = transformed.id() {
                    self.ctx.insert(kind, id);
                }
                Some(transformed)
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("{} already restored: {}", record_label(kind, raw), e);
                self.session.record_duplicate(kind);
                if let Some(id) = transformed.id() {
                    if let Ok(true) = self.tx.collection(kind).exists(&transformed.payload).await {
                        self.ctx.insert(kind, id);
                    }
                }
                None
            }
            Err(e) => {
                self.session.record_failed(
                    kind,
                    format!("Failed to restore {}: {}", record_label(kind, raw), e),
                );
                None
            }
        }
    }

    async fn patch_or_queue(
        &mut self,
        owner: EntityKind,
        owner_id: &str,
        field: &'static str,
        target: EntityKind,
        target_id: String,
    ) {
        let patch = PendingPatch {
            owner,
            owner_id: owner_id.to_string(),
            field,
            target,
            target_id,
        };
        if self.ctx.contains(target, &patch.target_id) {
            self.apply_patch(&patch).await;
        } else {
            self.pending.push(patch);
        }
    }

    async fn apply_patch(&mut self, patch: &PendingPatch) {
        let value = Value::String(patch.target_id.clone());
        if let Err(e) = self
            .tx
            .collection(patch.owner)
            .set_field(&patch.owner_id, patch.field, &value)
            .await
        {
            self.session.warn(format!(
                "Could not link {} {}.{} to {}: {}",
                patch.owner, patch.owner_id, patch.field, patch.target_id, e
            ));
        }
    }

    /// Second pass for back-references whose target was written later
    async fn apply_pending_patches(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return;
        }
        debug!("Applying {} queued back-references", pending.len());

        for patch in pending {
            if self.ctx.contains(patch.target, &patch.target_id) {
                self.apply_patch(&patch).await;
            } else {
                self.session.add_omitted(1);
                debug!(
                    "{} {}.{}: {} {} was never restored",
                    patch.owner, patch.owner_id, patch.field, patch.target, patch.target_id
                );
            }
        }
    }
}

fn record_label(kind: EntityKind, raw: &Value) -> String {
    if let Some(id) = raw.get("id").and_then(Value::as_str) {
        return format!("{} {}", kind, id);
    }
    if let Identity::Compound { left, right } = kind.def().identity {
        let endpoint = |column: &str| {
            raw.get(column)
                .and_then(|v| reference_id(v).ok().flatten())
                .unwrap_or_else(|| "?".to_string())
        };
        return format!("{} ({}, {})", kind, endpoint(left), endpoint(right));
    }
    format!("{} record without id", kind)
}

// ============================================================================
// Validate
// ============================================================================

async fn validate(
    tx: &mut StoreTx,
    artifact: &SnapshotArtifact,
    session: &mut RestoreSession,
    span: &ProgressSpan,
) -> Result<()> {
    span.enter("Validating restored data");

    for kind in RECREATION_ORDER {
        let Some(expected) = artifact.expected_count(kind) else {
            continue;
        };
        let actual = tx.collection(kind).count().await?;
        if actual != expected {
            session.warn(format!(
                "Count mismatch for {}: snapshot has {}, store has {}",
                kind, expected, actual
            ));
        }
    }

    for (parent, child, fk) in SPOT_CHECKS {
        if let Err(e) = spot_check(tx, artifact, session, parent, child, fk).await {
            session.warn(format!(
                "Spot check {} -> {} could not run: {:#}",
                parent, child, e
            ));
        }
    }

    span.report(1, 1, "Validation finished");
    Ok(())
}

/// Look up one parent from the artifact in the store and compare its
/// restored children with the artifact
async fn spot_check(
    tx: &mut StoreTx,
    artifact: &SnapshotArtifact,
    session: &mut RestoreSession,
    parent: EntityKind,
    child: EntityKind,
    fk: &'static str,
) -> Result<()> {
    let Some(parent_id) = artifact
        .collection(parent)
        .unwrap_or_default()
        .iter()
        .find_map(|raw| raw.get("id").and_then(Value::as_str))
        .map(str::to_string)
    else {
        debug!("Spot check {} -> {} skipped, snapshot holds no {}", parent, child, parent);
        return Ok(());
    };

    if tx.collection(parent).find_by_id(&parent_id).await?.is_none() {
        session.warn(format!(
            "Spot check {} {}: not found in restored store",
            parent, parent_id
        ));
        return Ok(());
    }

    let children = tx
        .collection(child)
        .find_many(&Filter::Eq(fk, Value::String(parent_id.clone())), None)
        .await?;
    let expected = expected_children(artifact, parent, child, fk, &parent_id);

    if children.len() != expected {
        session.warn(format!(
            "Spot check {} {}: expected {} {}, found {}",
            parent,
            parent_id,
            expected,
            child,
            children.len()
        ));
    } else {
        debug!(
            "Spot check {} {} -> {} {} ok",
            parent,
            parent_id,
            children.len(),
            child
        );
    }
    Ok(())
}

fn expected_children(
    artifact: &SnapshotArtifact,
    parent: EntityKind,
    child: EntityKind,
    fk: &str,
    parent_id: &str,
) -> usize {
    match parent.def().children {
        Some(link) if link.kind == child => artifact
            .collection(parent)
            .unwrap_or_default()
            .iter()
            .find(|raw| raw.get("id").and_then(Value::as_str) == Some(parent_id))
            .and_then(|raw| raw.get(link.field))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
        _ => artifact
            .collection(child)
            .unwrap_or_default()
            .iter()
            .filter(|raw| {
                raw.get(fk)
                    .and_then(|v| reference_id(v).ok().flatten())
                    .as_deref()
                    == Some(parent_id)
            })
            .count(),
    }
}
