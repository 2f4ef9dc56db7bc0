//! Statistics and timing for conversion jobs

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::progress::Stage;

/// Wall time spent in one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// Counters and timings collected for a single conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionStatistics {
    /// Input size in bytes as read
    pub input_size_bytes: u64,
    pub notes_read: usize,
    pub cards_read: usize,
    /// Source cards represented in the output
    pub cards_included: usize,
    /// Source cards left out (suspended)
    pub cards_excluded: usize,
    /// Output cards after cloze cards are merged
    pub output_cards: usize,
    pub decks: usize,
    pub note_types: usize,
    pub warnings: usize,
    pub stage_timings: Vec<StageTiming>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Throughput (input bytes per second)
    pub throughput_bytes_per_sec: f32,
    /// Timestamp of when statistics were collected
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl Default for ConversionStatistics {
    fn default() -> Self {
        Self {
            input_size_bytes: 0,
            notes_read: 0,
            cards_read: 0,
            cards_included: 0,
            cards_excluded: 0,
            output_cards: 0,
            decks: 0,
            note_types: 0,
            warnings: 0,
            stage_timings: Vec::new(),
            processing_time_ms: 0,
            throughput_bytes_per_sec: 0.0,
            collected_at: chrono::Utc::now(),
        }
    }
}

impl ConversionStatistics {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in timing fields from a finished stage timer
    pub fn with_timings(mut self, timer: StageTimer) -> Self {
        let processing_time = timer.elapsed();
        self.processing_time_ms = processing_time.as_millis() as u64;
        self.throughput_bytes_per_sec = if processing_time.as_secs_f64() > 0.0 {
            (self.input_size_bytes as f64 / processing_time.as_secs_f64()) as f32
        } else {
            0.0
        };
        self.stage_timings = timer.into_timings();
        self.collected_at = chrono::Utc::now();
        self
    }

    /// Time spent in `stage`, if it ran
    pub fn stage_time_ms(&self, stage: Stage) -> Option<u64> {
        self.stage_timings
            .iter()
            .find(|timing| timing.stage == stage)
            .map(|timing| timing.elapsed_ms)
    }

    /// Get a formatted summary
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Converted {} cards ({} excluded) from {} notes into {} decks in {:.2}s - {:.1}MB/s",
            self.cards_included,
            self.cards_excluded,
            self.notes_read,
            self.decks,
            self.processing_time_ms as f32 / 1000.0,
            self.throughput_bytes_per_sec / (1024.0 * 1024.0)
        );
        if self.warnings > 0 {
            summary.push_str(&format!(", {} warnings", self.warnings));
        }
        summary
    }

    /// Export to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Import from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Records how long each pipeline stage takes
pub struct StageTimer {
    start_time: Instant,
    stage_start: Instant,
    timings: Vec<StageTiming>,
}

impl StageTimer {
    /// Start tracking a new conversion job
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            stage_start: now,
            timings: Vec::new(),
        }
    }

    /// Close `stage` and start timing the next one
    pub fn finish_stage(&mut self, stage: Stage) {
        let now = Instant::now();
        self.timings.push(StageTiming {
            stage,
            elapsed_ms: now.duration_since(self.stage_start).as_millis() as u64,
        });
        self.stage_start = now;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
