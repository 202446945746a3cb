use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::database::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Idle,
    Cleanup,
    Recreate,
    Validate,
    Done,
    Failed,
}

impl RestorePhase {
    fn can_advance_to(self, next: RestorePhase) -> bool {
        matches!(
            (self, next),
            (RestorePhase::Idle, RestorePhase::Cleanup)
                | (RestorePhase::Cleanup, RestorePhase::Recreate)
                | (RestorePhase::Cleanup, RestorePhase::Done)
                | (RestorePhase::Recreate, RestorePhase::Validate)
                | (RestorePhase::Validate, RestorePhase::Done)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounters {
    pub restored: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// State of one restore invocation, discarded with its transaction
#[derive(Debug)]
pub struct RestoreSession {
    phase: RestorePhase,
    counters: BTreeMap<EntityKind, TypeCounters>,
    warnings: Vec<String>,
    omitted_relations: u64,
    started: Instant,
}

impl Default for RestoreSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreSession {
    pub fn new() -> Self {
        Self {
            phase: RestorePhase::Idle,
            counters: BTreeMap::new(),
            warnings: Vec::new(),
            omitted_relations: 0,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    pub fn advance(&mut self, next: RestorePhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(anyhow!(
                "Invalid restore phase transition {:?} -> {:?}",
                self.phase,
                next
            ));
        }
        debug!("Restore phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Any working phase may fail
    pub fn fail(&mut self) {
        if self.phase != RestorePhase::Done {
            self.phase = RestorePhase::Failed;
        }
    }

    fn counters_mut(&mut self, kind: EntityKind) -> &mut TypeCounters {
        self.counters.entry(kind).or_default()
    }

    pub fn counters(&self, kind: EntityKind) -> TypeCounters {
        self.counters.get(&kind).copied().unwrap_or_default()
    }

    pub fn record_restored(&mut self, kind: EntityKind) {
        self.counters_mut(kind).restored += 1;
    }

    pub fn record_duplicate(&mut self, kind: EntityKind) {
        self.counters_mut(kind).duplicates += 1;
    }

    /// Record dropped before writing; `warning` surfaces in the summary
    pub fn record_skipped(&mut self, kind: EntityKind, warning: Option<String>) {
        self.counters_mut(kind).skipped += 1;
        if let Some(message) = warning {
            self.warn(message);
        }
    }

    pub fn record_failed(&mut self, kind: EntityKind, message: String) {
        self.counters_mut(kind).failed += 1;
        self.warn(message);
    }

    pub fn add_omitted(&mut self, count: usize) {
        self.omitted_relations += count as u64;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn into_summary(self) -> RestoreSummary {
        let total_restored = self.counters.values().map(|c| c.restored).sum();
        RestoreSummary {
            collections: self
                .counters
                .into_iter()
                .map(|(kind, counters)| (kind.table().to_string(), counters))
                .collect(),
            total_restored,
            omitted_relations: self.omitted_relations,
            warnings: self.warnings,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Result attached to the final event of a restore stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub collections: BTreeMap<String, TypeCounters>,
    pub total_restored: u64,
    pub omitted_relations: u64,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl RestoreSummary {
    pub fn counters(&self, kind: EntityKind) -> TypeCounters {
        self.collections
            .get(kind.table())
            .copied()
            .unwrap_or_default()
    }
}
