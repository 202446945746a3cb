//! Relational snapshot and restore engine.
//!
//! - `generator` - concurrent, paged extraction of every collection
//! - `orchestrator` - cleanup, recreate and validate inside one transaction
//! - `transform` - per-entity payload builders and the strategy registry
//! - `order` - deletion and recreation orderings
//! - `progress` / `session` - caller-visible events and per-restore state
//! - `artifact` / `codec` - the versioned document and its gzip encoding

pub mod artifact;
pub mod codec;
pub mod generator;
pub mod orchestrator;
pub mod order;
pub mod progress;
pub mod session;
pub mod transform;

pub use artifact::{ArtifactSummary, SnapshotArtifact, SnapshotMetadata};
pub use generator::SnapshotGenerator;
pub use orchestrator::RestoreOrchestrator;
pub use progress::{ProgressEmitter, ProgressEvent, ProgressSpan, ProgressStatus};
pub use session::{RestorePhase, RestoreSession, RestoreSummary, TypeCounters};
