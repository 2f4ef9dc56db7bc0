//! Source format classification from a bounded prefix and the file name

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Number of leading bytes the detector ever looks at
pub const DETECTION_PREFIX_LEN: usize = 4096;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];

/// Closed set of supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Deck package (`.apkg`)
    #[serde(rename = "apkg")]
    Package,
    /// Whole-collection package (`.colpkg`)
    #[serde(rename = "colpkg")]
    CollectionPackage,
    /// Bare SQLite collection (`.anki2`, `.anki21`, ...)
    #[serde(rename = "anki2")]
    Database,
    /// zstd-compressed SQLite collection (`.anki21b`)
    #[serde(rename = "anki21b")]
    CompressedDatabase,
    /// Tab-separated notes (`.txt`, `.tsv`)
    #[serde(rename = "tsv")]
    DelimitedText,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Package => "apkg",
            SourceFormat::CollectionPackage => "colpkg",
            SourceFormat::Database => "anki2",
            SourceFormat::CompressedDatabase => "anki21b",
            SourceFormat::DelimitedText => "tsv",
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, SourceFormat::Package | SourceFormat::CollectionPackage)
    }

    /// Classify by extension alone
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "apkg" => Some(SourceFormat::Package),
            "colpkg" => Some(SourceFormat::CollectionPackage),
            "anki2" | "anki21" | "db" | "sqlite" | "sqlite3" => Some(SourceFormat::Database),
            "anki21b" => Some(SourceFormat::CompressedDatabase),
            "tsv" | "txt" => Some(SourceFormat::DelimitedText),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final extension of a file name, if any
fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename).extension().and_then(|ext| ext.to_str())
}

/// Classify input by signature first, then by extension.
///
/// Returns `None` when neither is recognized; the caller reports
/// `InvalidFormat`.
pub fn detect(prefix: &[u8], filename: &str) -> Option<SourceFormat> {
    let prefix = &prefix[..prefix.len().min(DETECTION_PREFIX_LEN)];
    let by_extension = extension_of(filename).and_then(SourceFormat::from_extension);

    if prefix.starts_with(ZIP_LOCAL_HEADER) || prefix.starts_with(ZIP_EMPTY_ARCHIVE) {
        return Some(match by_extension {
            Some(SourceFormat::CollectionPackage) => SourceFormat::CollectionPackage,
            _ => SourceFormat::Package,
        });
    }
    if prefix.starts_with(SQLITE_HEADER) {
        return Some(SourceFormat::Database);
    }
    if prefix.starts_with(ZSTD_MAGIC) {
        return Some(SourceFormat::CompressedDatabase);
    }

    by_extension
}
