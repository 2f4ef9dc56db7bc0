//! Command-line interface module

use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversion::{
    ConversionConfig, ConversionResult, ExecutionTier, ProgressEvent, ProgressSink, Stage,
};
use crate::error::ConversionError;
use crate::parser::InputSource;

pub mod filename;

pub use filename::{sanitize, SanitizeOptions};

/// Main CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ankiconv")]
#[command(about = "Convert Anki packages, collections and text exports to JSON")]
#[command(version)]
#[command(long_about = None)]
pub struct Args {
    /// Input file (.apkg, .colpkg, .anki2, .anki21, .anki21b, .txt, .tsv)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSON file, or an existing directory to write into
    #[arg(short, long)]
    pub output: PathBuf,

    /// Attach scheduling statistics to every card
    #[arg(long)]
    pub include_stats: bool,

    /// Keep suspended cards and flag them with "suspended"
    #[arg(long)]
    pub include_suspended: bool,

    /// Input size tier: interactive (100MB) or batch (1GB)
    #[arg(long, value_enum, default_value_t = Tier::Batch)]
    pub tier: Tier,

    /// Write compact JSON instead of pretty-printing
    #[arg(long)]
    pub compact: bool,

    /// Print conversion statistics when done
    #[arg(long)]
    pub summary: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Execution tier for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    #[value(name = "interactive", alias = "browser")]
    Interactive,
    #[value(name = "batch", alias = "cli")]
    Batch,
}

impl From<Tier> for ExecutionTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Interactive => ExecutionTier::Interactive,
            Tier::Batch => ExecutionTier::Batch,
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub args: Args,
    pub conversion_config: ConversionConfig,
}

impl CliConfig {
    /// Create CLI configuration from arguments
    pub fn from_args(args: Args) -> ConversionResult<Self> {
        let conversion_config = Self::create_conversion_config(&args)?;

        Ok(Self {
            args,
            conversion_config,
        })
    }

    /// Create conversion configuration from CLI arguments
    fn create_conversion_config(args: &Args) -> ConversionResult<ConversionConfig> {
        let config = ConversionConfig::new()
            .with_tier(args.tier.into())
            .with_stats(args.include_stats)
            .with_suspended(args.include_suspended)
            .with_pretty(!args.compact);

        // Validate configuration
        config
            .validate()
            .map_err(|e| ConversionError::unknown(format!("invalid configuration: {}", e)))?;

        Ok(config)
    }

    pub fn input_source(&self) -> InputSource {
        InputSource::from_file(&self.args.input)
    }

    /// Final output path. An existing directory gets a file name derived
    /// from the input's name.
    pub fn output_path(&self) -> PathBuf {
        resolve_output_path(&self.args.input, &self.args.output)
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.args.quiet
    }

    /// Check if a statistics summary is requested
    pub fn want_summary(&self) -> bool {
        self.args.summary
    }

    /// Get input source description
    pub fn input_description(&self) -> String {
        format!("'{}'", self.args.input.display())
    }

    /// Get output destination description
    pub fn output_description(&self) -> String {
        format!("'{}'", self.output_path().display())
    }
}

/// Map the `--output` argument to a file path
pub fn resolve_output_path(input: &Path, output: &Path) -> PathBuf {
    if !output.is_dir() {
        return output.to_path_buf();
    }
    let collection_name = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.join(sanitize(&collection_name, &SanitizeOptions::default()))
}

/// Progress sink that drives an indicatif bar on stderr
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: CliUtils::create_progress_bar(100),
        }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, event: ProgressEvent) {
        self.bar.set_position(u64::from(event.percent));
        match event.stage {
            Stage::Failed => self.bar.abandon_with_message(event.message),
            _ => self.bar.set_message(format!("{}: {}", event.stage, event.message)),
        }
    }
}

/// CLI utilities and helpers
pub struct CliUtils;

impl CliUtils {
    /// Format a file size in human-readable format
    pub fn format_file_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", bytes, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }

    /// Format a duration in human-readable format
    pub fn format_duration(duration: Duration) -> String {
        let total_millis = duration.as_millis();

        if total_millis < 1000 {
            format!("{}ms", total_millis)
        } else if total_millis < 60_000 {
            format!("{:.1}s", total_millis as f64 / 1000.0)
        } else {
            let minutes = total_millis / 60_000;
            let seconds = (total_millis % 60_000) / 1000;
            format!("{}m {}s", minutes, seconds)
        }
    }

    /// Create a percent progress bar for one conversion
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let template = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% {msg}";
        if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb
    }

    /// Show a success message (if not in quiet mode)
    pub fn show_success(message: &str, quiet: bool) {
        if !quiet {
            println!("{} {}", style("✓").green(), message);
        }
    }

    /// Show an error message
    pub fn show_error(message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    /// Show a warning message (if not in quiet mode)
    pub fn show_warning(message: &str, quiet: bool) {
        if !quiet {
            eprintln!("{} {}", style("⚠").yellow(), message);
        }
    }
}

const USAGE_HINT: &str = "Try 'ankiconv --help' for usage information.";

/// Text printed for a failed run; only argument mistakes point at `--help`
pub fn error_report(error: &ConversionError, usage_hint: bool) -> String {
    let message = error.user_message();
    if usage_hint {
        format!("{}\n\n{}", message, USAGE_HINT)
    } else {
        message
    }
}

/// Report a failed conversion
pub fn handle_error(error: &ConversionError) {
    CliUtils::show_error(&error_report(error, false));
}

/// Report arguments that do not form a valid configuration
pub fn handle_config_error(error: &ConversionError) {
    CliUtils::show_error(&error_report(error, true));
}
