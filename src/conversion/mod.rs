//! Collection conversion pipeline
//!
//! This module contains the staged pipeline, its configuration, progress
//! and cancellation plumbing, resource limits and statistics.

pub mod config;
pub mod engine;
pub mod limits;
pub mod progress;
pub mod stats;

pub use config::{ClozePrecedence, ConversionConfig, ExecutionTier};
pub use engine::{convert_bytes, ConversionPipeline, ConversionReport};
pub use progress::{
    CancellationToken, NoProgress, ProgressEvent, ProgressReporter, ProgressSink, Stage,
};
pub use stats::{ConversionStatistics, StageTiming};

pub use crate::error::ConversionResult;
