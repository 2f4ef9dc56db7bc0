//! Anki collection converter
//!
//! Converts flashcard packages (`.apkg`, `.colpkg`), bare collection
//! databases (`.anki2`, `.anki21`, `.anki21b`) and tab-separated text
//! exports into a hierarchical JSON document of decks and cards.
//!
//! ```no_run
//! use ankiconv::{ConversionConfig, ConversionPipeline, InputSource, NoProgress};
//!
//! let pipeline = ConversionPipeline::new(ConversionConfig::batch());
//! let report = pipeline.convert(&InputSource::from_file("Spanish.apkg"), &NoProgress)?;
//! println!("{}", report.to_json(true)?);
//! # Ok::<(), ankiconv::ConversionError>(())
//! ```

pub mod cli;
pub mod conversion;
pub mod error;
pub mod formatter;
pub mod model;
pub mod parser;
pub mod validation;

// Re-export commonly used types
pub use conversion::{
    convert_bytes, CancellationToken, ClozePrecedence, ConversionConfig, ConversionPipeline,
    ConversionReport, ConversionStatistics, ExecutionTier, NoProgress, ProgressEvent,
    ProgressSink, Stage,
};
pub use error::{ConversionError, ConversionErrorKind, ConversionResult, ParseError};
pub use formatter::JsonBuilder;
pub use model::{CardContent, ConversionMetadata, ConversionOutput, Deck, OutputCard};
pub use parser::{InputSource, SourceFormat};

/// Convert a file on disk with default configuration
pub fn convert_file(path: impl AsRef<std::path::Path>) -> ConversionResult<ConversionOutput> {
    let input = InputSource::from_file(path.as_ref());
    ConversionPipeline::default()
        .convert_quiet(&input)
        .map(|report| report.output)
}
