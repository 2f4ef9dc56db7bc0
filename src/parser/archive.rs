//! Package (zip) extraction with per-entry bomb protection

use std::io::Cursor;

use zip::ZipArchive;

use crate::conversion::config::ConversionConfig;
use crate::conversion::limits;
use crate::error::{ConversionError, ConversionErrorKind, ConversionResult};

/// Collection entry names, newest revision first
pub const COLLECTION_ENTRY_NAMES: &[&str] =
    &["collection.anki21b", "collection.anki21", "collection.anki2"];

/// Database bytes pulled out of a package
#[derive(Debug, Clone)]
pub struct EmbeddedDatabase {
    /// Archive entry the bytes came from
    pub entry_name: String,
    /// Plain SQLite bytes (zstd entries are already decompressed)
    pub bytes: Vec<u8>,
}

/// Unpacks `.apkg`/`.colpkg` archives
pub struct ArchiveExtractor<'a> {
    config: &'a ConversionConfig,
}

impl<'a> ArchiveExtractor<'a> {
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self { config }
    }

    /// Locate and return the newest collection database in the archive
    pub fn extract(&self, archive_bytes: &[u8]) -> ConversionResult<EmbeddedDatabase> {
        let mut archive = ZipArchive::new(Cursor::new(archive_bytes)).map_err(|e| {
            ConversionError::with_source(
                ConversionErrorKind::corrupted(format!("not a valid package archive: {}", e)),
                e,
            )
        })?;

        self.check_entries(&mut archive)?;

        let entry_name = COLLECTION_ENTRY_NAMES
            .iter()
            .find(|name| archive.index_for_name(name).is_some())
            .ok_or_else(|| {
                ConversionError::corrupted(
                    "package contains no collection database (collection.anki21b, collection.anki21 or collection.anki2)",
                )
            })?;
        tracing::debug!("using archive entry {}", entry_name);

        let entry = archive.by_name(entry_name).map_err(|e| {
            ConversionError::with_source(
                ConversionErrorKind::corrupted(format!("cannot open entry: {}", e)),
                e,
            )
            .with_record(*entry_name)
        })?;
        let declared = entry.size();
        let bytes = limits::read_bounded(entry, declared, entry_name).map_err(|e| {
            let e = if matches!(e.kind, ConversionErrorKind::ResourceLimitExceeded { .. }) {
                ConversionError::corrupted(format!(
                    "entry inflates past its declared size of {} bytes",
                    declared
                ))
            } else {
                e
            };
            e.with_record(*entry_name)
        })?;

        let bytes = if entry_name.ends_with(".anki21b") {
            decompress_database(&bytes, self.config.max_input_size)
                .map_err(|e| e.with_record(*entry_name))?
        } else {
            bytes
        };

        Ok(EmbeddedDatabase {
            entry_name: entry_name.to_string(),
            bytes,
        })
    }

    /// Apply the declared-size checks to every entry before inflating any
    fn check_entries(&self, archive: &mut ZipArchive<Cursor<&[u8]>>) -> ConversionResult<()> {
        let mut total: u64 = 0;
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(|e| {
                ConversionError::with_source(
                    ConversionErrorKind::corrupted(format!("unreadable archive entry {}: {}", index, e)),
                    e,
                )
            })?;
            limits::check_archive_entry(
                entry.name(),
                entry.compressed_size(),
                entry.size(),
                self.config,
            )?;
            total = total.saturating_add(entry.size());
        }

        if total > self.config.max_input_size {
            return Err(ConversionError::resource_limit(
                "uncompressed package",
                total,
                self.config.max_input_size,
            ));
        }
        Ok(())
    }
}

/// Decompress a zstd collection, refusing output larger than `limit`
pub fn decompress_database(compressed: &[u8], limit: u64) -> ConversionResult<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(compressed).map_err(|e| {
        ConversionError::with_source(
            ConversionErrorKind::corrupted(format!("invalid zstd stream: {}", e)),
            e,
        )
    })?;
    limits::read_bounded(decoder, limit, "decompressed collection")
}
