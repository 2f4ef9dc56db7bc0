use clap::Parser;
use std::fs;
use std::process;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ankiconv::cli::{handle_config_error, handle_error, Args, BarProgress, CliConfig, CliUtils};
use ankiconv::{ConversionError, ConversionPipeline, NoProgress};

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let config = match CliConfig::from_args(args) {
        Ok(config) => config,
        Err(error) => {
            handle_config_error(&error);
            process::exit(1);
        }
    };

    if let Err(error) = run(&config) {
        match error.downcast_ref::<ConversionError>() {
            Some(conversion_error) => handle_error(conversion_error),
            None => CliUtils::show_error(&format!("{:#}", error)),
        }
        process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the level picked from the flags
fn init_logging(args: &Args) {
    let default_filter = if args.verbose {
        "ankiconv=debug"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(config: &CliConfig) -> Result<()> {
    let input = config.input_source();
    let pipeline = ConversionPipeline::new(config.conversion_config.clone());
    tracing::debug!("converting {}", config.input_description());

    let report = if config.is_quiet() {
        pipeline.convert(&input, &NoProgress)?
    } else {
        let bar = BarProgress::new();
        let result = pipeline.convert(&input, &bar);
        bar.finish();
        result?
    };

    let json = report.to_json(config.conversion_config.pretty)?;
    let output_path = config.output_path();
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(&output_path, json.as_bytes())
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    let metadata = &report.output.metadata;
    if !metadata.warnings.is_empty() {
        CliUtils::show_warning(
            &format!(
                "{} record(s) were repaired or skipped; see \"warnings\" in the output",
                metadata.warnings.len()
            ),
            config.is_quiet(),
        );
    }
    CliUtils::show_success(
        &format!(
            "Converted {} cards in {} decks to {} ({}, {})",
            metadata.total_cards,
            metadata.total_decks,
            config.output_description(),
            CliUtils::format_file_size(json.len() as u64),
            CliUtils::format_duration(std::time::Duration::from_millis(
                metadata.processing_time_ms
            )),
        ),
        config.is_quiet(),
    );

    if config.want_summary() {
        let statistics = &report.statistics;
        println!("{}", statistics.summary());
        for timing in &statistics.stage_timings {
            println!("  {:<12} {}ms", timing.stage.as_str(), timing.elapsed_ms);
        }
    }

    Ok(())
}
