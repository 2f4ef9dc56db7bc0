use std::io::Read;

use crate::conversion::config::ConversionConfig;
use crate::error::{ConversionError, ConversionResult};
use crate::parser::InputSource;

/// Check the source size before attempting to read it.
/// This avoids loading very large files into memory if the configured
/// limit is smaller than the file.
pub fn check_source_size_before_read(
    source: &InputSource,
    config: &ConversionConfig,
) -> ConversionResult<()> {
    if let Some(size) = source.estimated_size() {
        check_input_size(size, config)?;
    }
    Ok(())
}

pub fn check_input_size(size: u64, config: &ConversionConfig) -> ConversionResult<()> {
    if size > config.max_input_size {
        return Err(ConversionError::resource_limit(
            "input",
            size,
            config.max_input_size,
        ));
    }
    Ok(())
}

/// Reject an archive entry whose declared sizes look like a decompression bomb.
///
/// Runs on header metadata only, before any byte of the entry is inflated.
pub fn check_archive_entry(
    name: &str,
    compressed: u64,
    uncompressed: u64,
    config: &ConversionConfig,
) -> ConversionResult<()> {
    if uncompressed > config.max_input_size {
        return Err(ConversionError::resource_limit(
            format!("archive entry '{}'", name),
            uncompressed,
            config.max_input_size,
        )
        .with_record(name));
    }

    let allowed = compressed.saturating_mul(config.max_compression_ratio);
    if uncompressed > allowed {
        return Err(ConversionError::resource_limit(
            format!(
                "uncompressed archive entry '{}' ({}x ratio cap, {} bytes compressed)",
                name, config.max_compression_ratio, compressed
            ),
            uncompressed,
            allowed,
        )
        .with_record(name));
    }

    Ok(())
}

/// Read at most `limit` bytes; more data than that is an error, not a truncation
pub fn read_bounded<R: Read>(reader: R, limit: u64, what: &str) -> ConversionResult<Vec<u8>> {
    let mut buffer = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(|e| {
            ConversionError::with_source(
                crate::error::ConversionErrorKind::corrupted(format!(
                    "failed to read {}: {}",
                    what, e
                )),
                e,
            )
        })?;

    if buffer.len() as u64 > limit {
        return Err(ConversionError::resource_limit(
            what,
            buffer.len() as u64,
            limit,
        ));
    }
    Ok(buffer)
}
