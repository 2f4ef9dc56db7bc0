//! Staged conversion pipeline
//!
//! `Detecting -> Parsing -> Extracting -> Transforming -> Building -> Done`,
//! with `Failed` reachable from any stage. Each stage checks the
//! cancellation token on entry and every `cancel_check_interval` records.

use crate::conversion::config::ConversionConfig;
use crate::conversion::limits;
use crate::conversion::progress::{
    CancellationToken, NoProgress, ProgressReporter, ProgressSink, Stage,
};
use crate::conversion::stats::{ConversionStatistics, StageTimer};
use crate::error::{ConversionError, ConversionErrorKind, ConversionResult};
use crate::formatter::{BuiltCards, CleanedNotes, JsonBuilder};
use crate::model::{ConversionOutput, NormalizedRecordSet};
use crate::parser::archive::decompress_database;
use crate::parser::detect::DETECTION_PREFIX_LEN;
use crate::parser::{
    detect, ArchiveExtractor, DelimitedTextParser, InputSource, SchemaReader, SourceFormat,
};

/// Successful conversion: the document plus job statistics
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output: ConversionOutput,
    pub statistics: ConversionStatistics,
}

impl ConversionReport {
    /// Serialize the output document
    pub fn to_json(&self, pretty: bool) -> ConversionResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(&self.output)
        } else {
            serde_json::to_string(&self.output)
        };
        json.map_err(|e| {
            ConversionError::with_source(
                ConversionErrorKind::unknown(format!("failed to serialize output: {}", e)),
                e,
            )
            .in_stage(Stage::Building)
        })
    }
}

/// Main conversion pipeline
///
/// A pipeline can run any number of conversions, but cancellation is
/// permanent: once its token is tripped every later `convert` fails with
/// `Cancelled`. Swap in a fresh token with `with_cancellation` to reuse it.
pub struct ConversionPipeline {
    config: ConversionConfig,
    cancel: CancellationToken,
}

impl ConversionPipeline {
    /// Create a new pipeline with its own cancellation token
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a token owned by the host, replacing the current one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle the host can use to cancel a running `convert`; the token
    /// is never reset
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Convert without progress reporting
    pub fn convert_quiet(&self, input: &InputSource) -> ConversionResult<ConversionReport> {
        self.convert(input, &NoProgress)
    }

    /// Run every stage for `input`, emitting progress to `progress`.
    ///
    /// On failure a single `Failed` event is emitted and no output is
    /// produced.
    pub fn convert(
        &self,
        input: &InputSource,
        progress: &dyn ProgressSink,
    ) -> ConversionResult<ConversionReport> {
        let mut reporter = ProgressReporter::new(progress);
        match self.run(input, &mut reporter) {
            Ok(report) => {
                reporter.report(Stage::Done, 100, "Conversion complete");
                tracing::debug!("{}", report.statistics.summary());
                Ok(report)
            }
            Err(error) => {
                tracing::debug!("conversion of {} failed: {}", input.description(), error);
                reporter.report(Stage::Failed, 0, error.to_string());
                Err(error)
            }
        }
    }

    fn run(
        &self,
        input: &InputSource,
        reporter: &mut ProgressReporter<'_>,
    ) -> ConversionResult<ConversionReport> {
        self.config.validate().map_err(|message| {
            ConversionError::unknown(format!("invalid configuration: {}", message))
        })?;
        let mut timer = StageTimer::start();

        reporter.enter(Stage::Detecting, format!("Reading {}", input.description()));
        let (format, data) = self.detect_stage(input).map_err(|e| e.in_stage(Stage::Detecting))?;
        let input_size = data.len() as u64;
        timer.finish_stage(Stage::Detecting);

        reporter.enter(Stage::Parsing, format!("Parsing {} input", format));
        let records = self
            .parse_stage(format, data, input, reporter)
            .map_err(|e| e.in_stage(Stage::Parsing))?;
        timer.finish_stage(Stage::Parsing);

        let builder = JsonBuilder::new(&self.config);

        reporter.enter(Stage::Extracting, "Extracting text");
        let cleaned = self
            .extract_stage(&builder, &records, reporter)
            .map_err(|e| e.in_stage(Stage::Extracting))?;
        timer.finish_stage(Stage::Extracting);

        reporter.enter(Stage::Transforming, "Building cards");
        let cards = self
            .transform_stage(&builder, &records, &cleaned, reporter)
            .map_err(|e| e.in_stage(Stage::Transforming))?;
        drop(cleaned);
        timer.finish_stage(Stage::Transforming);

        reporter.enter(Stage::Building, "Assembling deck hierarchy");
        self.checkpoint(Stage::Building)?;
        let mut statistics = ConversionStatistics {
            input_size_bytes: input_size,
            notes_read: records.notes.len(),
            cards_read: records.cards.len(),
            cards_included: cards.included,
            cards_excluded: cards.excluded,
            output_cards: cards.output_cards(),
            note_types: records.note_types.len(),
            warnings: records.anomalies.len(),
            ..Default::default()
        };
        let (decks, mut metadata) = builder.assemble(&records, cards, format);
        timer.finish_stage(Stage::Building);

        metadata.processing_time_ms = timer.elapsed().as_millis() as u64;
        statistics.decks = metadata.total_decks;
        let statistics = statistics.with_timings(timer);

        Ok(ConversionReport {
            output: ConversionOutput { decks, metadata },
            statistics,
        })
    }

    fn checkpoint(&self, stage: Stage) -> ConversionResult<()> {
        self.cancel.check().map_err(|e| e.in_stage(stage))
    }

    /// Report progress and honor cancellation every `cancel_check_interval` records
    fn tick(
        &self,
        reporter: &mut ProgressReporter<'_>,
        stage: Stage,
        done: usize,
        total: usize,
    ) -> ConversionResult<()> {
        let interval = self.config.cancel_check_interval.max(1);
        if done % interval == 0 || done == total {
            self.cancel.check()?;
            reporter.advance(stage, done, total, format!("{} {}/{}", stage, done, total));
        }
        Ok(())
    }

    fn detect_stage(&self, input: &InputSource) -> ConversionResult<(SourceFormat, Vec<u8>)> {
        self.cancel.check()?;
        limits::check_source_size_before_read(input, &self.config)?;
        let data = input.read(self.config.max_input_size)?;
        limits::check_input_size(data.len() as u64, &self.config)?;

        let filename = input.filename();
        let prefix = &data[..data.len().min(DETECTION_PREFIX_LEN)];
        let format = detect(prefix, &filename).ok_or_else(|| {
            ConversionError::invalid_format(format!(
                "'{}' is not a recognized flashcard package, collection or text export",
                filename
            ))
            .with_record(filename.clone())
        })?;
        tracing::debug!("detected {} for {}", format, filename);
        Ok((format, data))
    }

    fn parse_stage(
        &self,
        format: SourceFormat,
        data: Vec<u8>,
        input: &InputSource,
        reporter: &mut ProgressReporter<'_>,
    ) -> ConversionResult<NormalizedRecordSet> {
        self.cancel.check()?;
        let reader = SchemaReader::new(&self.config).with_cancellation(&self.cancel);
        let (start, end) = Stage::Parsing.range();
        let midpoint = start + (end - start) / 2;

        match format {
            SourceFormat::Package | SourceFormat::CollectionPackage => {
                let database = ArchiveExtractor::new(&self.config).extract(&data)?;
                drop(data);
                reporter.report(
                    Stage::Parsing,
                    midpoint,
                    format!("Extracted {}", database.entry_name),
                );
                self.cancel.check()?;
                reader.read(&database.bytes)
            }
            SourceFormat::CompressedDatabase => {
                let database = decompress_database(&data, self.config.max_input_size)?;
                drop(data);
                reporter.report(Stage::Parsing, midpoint, "Decompressed collection");
                self.cancel.check()?;
                reader.read(&database)
            }
            SourceFormat::Database => reader.read(&data),
            SourceFormat::DelimitedText => {
                let text = String::from_utf8(data).map_err(|e| {
                    ConversionError::with_source(
                        ConversionErrorKind::invalid_format(
                            "text export is not valid UTF-8".to_string(),
                        ),
                        e,
                    )
                })?;
                let mut parser = DelimitedTextParser::new();
                if let Some(stem) = input.stem() {
                    parser = parser.with_deck_name(stem);
                }
                Ok(parser.parse(&text)?)
            }
        }
    }

    fn extract_stage(
        &self,
        builder: &JsonBuilder<'_>,
        records: &NormalizedRecordSet,
        reporter: &mut ProgressReporter<'_>,
    ) -> ConversionResult<CleanedNotes> {
        self.cancel.check()?;
        builder.clean_notes(records, &mut |done, total| {
            self.tick(reporter, Stage::Extracting, done, total)
        })
    }

    fn transform_stage(
        &self,
        builder: &JsonBuilder<'_>,
        records: &NormalizedRecordSet,
        cleaned: &CleanedNotes,
        reporter: &mut ProgressReporter<'_>,
    ) -> ConversionResult<BuiltCards> {
        self.cancel.check()?;
        builder.build_cards(records, cleaned, &mut |done, total| {
            self.tick(reporter, Stage::Transforming, done, total)
        })
    }
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new(ConversionConfig::default())
    }
}

/// Convert in-memory bytes with default progress handling
pub fn convert_bytes(
    data: Vec<u8>,
    filename: &str,
    config: ConversionConfig,
) -> ConversionResult<ConversionOutput> {
    let input = InputSource::from_bytes(data, filename);
    ConversionPipeline::new(config)
        .convert_quiet(&input)
        .map(|report| report.output)
}
