//! Stage model, progress events and cooperative cancellation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::{ConversionError, ConversionResult};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detecting,
    Parsing,
    Extracting,
    Transforming,
    Building,
    Done,
    Failed,
}

impl Stage {
    /// Share of the 0-100 scale owned by this stage
    pub fn range(&self) -> (u8, u8) {
        match self {
            Stage::Detecting => (0, 5),
            Stage::Parsing => (5, 45),
            Stage::Extracting => (45, 75),
            Stage::Transforming => (75, 90),
            Stage::Building => (90, 99),
            Stage::Done => (100, 100),
            Stage::Failed => (0, 0),
        }
    }

    /// Percent for `done` of `total` units inside this stage
    pub fn percent_at(&self, done: usize, total: usize) -> u8 {
        let (start, end) = self.range();
        if total == 0 || end <= start {
            return start;
        }
        let span = (end - start) as usize;
        start + (span * done.min(total) / total) as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detecting => "detecting",
            Stage::Parsing => "parsing",
            Stage::Extracting => "extracting",
            Stage::Transforming => "transforming",
            Stage::Building => "building",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
}

/// Receiver of progress events; emission is fire-and-forget
pub trait ProgressSink {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A host that stopped listening must not fail the job
        let _ = self.send(event);
    }
}

/// Shared cancellation flag a host can trip from another thread
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag has been tripped
    pub fn check(&self) -> ConversionResult<()> {
        if self.is_cancelled() {
            Err(ConversionError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Wraps a sink and keeps the reported percent non-decreasing
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last_percent: u8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    /// Emit `percent` clamped to the stage range and to the last value sent
    pub fn report(&mut self, stage: Stage, percent: u8, message: impl Into<String>) {
        let (start, end) = stage.range();
        let percent = if stage == Stage::Failed {
            self.last_percent
        } else {
            percent.clamp(start, end).max(self.last_percent)
        };
        self.last_percent = percent;
        self.sink.emit(ProgressEvent {
            stage,
            percent,
            message: message.into(),
        });
    }

    /// Emit the start of a stage
    pub fn enter(&mut self, stage: Stage, message: impl Into<String>) {
        self.report(stage, stage.range().0, message);
    }

    /// Emit a position within a stage
    pub fn advance(&mut self, stage: Stage, done: usize, total: usize, message: impl Into<String>) {
        self.report(stage, stage.percent_at(done, total), message);
    }
}
