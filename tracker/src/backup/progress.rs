//! Caller-visible progress stream.
//!
//! A [`ProgressEmitter`] owns the sending side of one operation's event
//! channel and guarantees the percentages it emits never decrease. Running
//! events are capped at 99; the terminal event (`completed` or `error`) is
//! always exactly 100 and nothing is emitted after it.
//!
//! Components report through a [`ProgressSpan`], a sub-range of the 0-100
//! scale, so they only count their own steps.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::artifact::ArtifactSummary;
use super::session::RestoreSummary;
use crate::constants::progress::DONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    InProgress,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_summary: Option<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RestoreSummary>,
}

#[derive(Debug, Default)]
struct EmitterState {
    last: u8,
    finished: bool,
}

#[derive(Clone)]
pub struct ProgressEmitter {
    tx: UnboundedSender<ProgressEvent>,
    state: Arc<Mutex<EmitterState>>,
}

impl ProgressEmitter {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                state: Arc::new(Mutex::new(EmitterState::default())),
            },
            rx,
        )
    }

    pub fn started(&self, message: impl Into<String>) {
        self.emit(ProgressStatus::Started, 0, message.into(), None, None);
    }

    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        self.emit(
            ProgressStatus::InProgress,
            percent.min(DONE - 1),
            message.into(),
            None,
            None,
        );
    }

    pub fn snapshot_completed(&self, message: impl Into<String>, summary: ArtifactSummary) {
        self.emit(
            ProgressStatus::Completed,
            DONE,
            message.into(),
            Some(summary),
            None,
        );
    }

    pub fn restore_completed(&self, message: impl Into<String>, result: RestoreSummary) {
        self.emit(
            ProgressStatus::Completed,
            DONE,
            message.into(),
            None,
            Some(result),
        );
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ProgressStatus::Error, DONE, message.into(), None, None);
    }

    pub fn span(&self, start: u8, end: u8) -> ProgressSpan {
        ProgressSpan {
            emitter: Some(self.clone()),
            start,
            end: end.max(start),
        }
    }

    fn emit(
        &self,
        status: ProgressStatus,
        percent: u8,
        message: String,
        artifact_summary: Option<ArtifactSummary>,
        result: Option<RestoreSummary>,
    ) {
        // Held across send so concurrent reporters cannot reorder events
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finished {
            debug!("Dropping progress event after terminal event: {}", message);
            return;
        }

        let progress = percent.max(state.last);
        state.last = progress;
        state.finished = status.is_terminal();

        let event = ProgressEvent {
            status,
            progress,
            message,
            artifact_summary,
            result,
        };
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

/// A sub-range of the progress scale
#[derive(Clone)]
pub struct ProgressSpan {
    emitter: Option<ProgressEmitter>,
    start: u8,
    end: u8,
}

impl ProgressSpan {
    /// Span that reports nowhere
    pub fn silent() -> Self {
        Self {
            emitter: None,
            start: 0,
            end: 0,
        }
    }

    pub fn percent_at(&self, done: usize, total: usize) -> u8 {
        let width = (self.end - self.start) as usize;
        let offset = if total == 0 {
            width
        } else {
            width * done.min(total) / total
        };
        self.start + offset as u8
    }

    pub fn report(&self, done: usize, total: usize, message: impl Into<String>) {
        if let Some(emitter) = &self.emitter {
            emitter.progress(self.percent_at(done, total), message);
        }
    }

    pub fn enter(&self, message: impl Into<String>) {
        self.report(0, 1, message);
    }

    /// Sub-span covering `from`..`to` percent of this span
    pub fn slice(&self, from: u8, to: u8) -> ProgressSpan {
        let width = (self.end - self.start) as usize;
        let start = self.start + (width * from.min(100) as usize / 100) as u8;
        let end = self.start + (width * to.min(100) as usize / 100) as u8;
        ProgressSpan {
            emitter: self.emitter.clone(),
            start,
            end: end.max(start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_progress_never_decreases() {
        let (emitter, mut rx) = ProgressEmitter::channel();
        emitter.started("go");
        emitter.progress(40, "forty");
        emitter.progress(20, "late reporter");
        emitter.progress(55, "fifty-five");

        let progress: Vec<u8> = drain(&mut rx).iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![0, 40, 40, 55]);
    }

    #[test]
    fn test_running_events_capped_below_done() {
        let (emitter, mut rx) = ProgressEmitter::channel();
        emitter.progress(100, "almost");
        emitter.error("boom");
        emitter.progress(10, "after terminal");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].progress, 99);
        assert_eq!(events[1].status, ProgressStatus::Error);
        assert_eq!(events[1].progress, 100);
    }

    #[test]
    fn test_span_maps_steps_into_band() {
        let (emitter, _rx) = ProgressEmitter::channel();
        let span = emitter.span(50, 90);
        assert_eq!(span.percent_at(0, 4), 50);
        assert_eq!(span.percent_at(2, 4), 70);
        assert_eq!(span.percent_at(4, 4), 90);
        assert_eq!(span.percent_at(0, 0), 90);

        let cleanup = span.slice(0, 20);
        assert_eq!((cleanup.start, cleanup.end), (50, 58));
        let validate = span.slice(90, 100);
        assert_eq!((validate.start, validate.end), (86, 90));
    }

    #[test]
    fn test_silent_span_does_nothing() {
        let span = ProgressSpan::silent();
        span.report(1, 2, "ignored");
        assert_eq!(span.slice(10, 50).percent_at(1, 1), 0);
    }
}
