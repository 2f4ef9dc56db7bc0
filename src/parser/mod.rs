//! Source readers: format detection, archives, databases and delimited text

pub mod archive;
pub mod delimited;
pub mod detect;
pub mod proto;
pub mod schema;

pub use archive::ArchiveExtractor;
pub use delimited::DelimitedTextParser;
pub use detect::{detect, SourceFormat};
pub use schema::SchemaReader;

use std::path::{Path, PathBuf};

use crate::conversion::limits;
use crate::error::{ConversionError, ConversionErrorKind, ConversionResult};

/// Input handed to the pipeline
#[derive(Debug, Clone)]
pub enum InputSource {
    /// In-memory bytes with the name they were uploaded under
    Bytes { data: Vec<u8>, filename: String },
    /// Path on the local filesystem
    File(PathBuf),
}

impl InputSource {
    pub fn from_bytes(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self::Bytes {
            data,
            filename: filename.into(),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// File name used for extension-based detection
    pub fn filename(&self) -> String {
        match self {
            InputSource::Bytes { filename, .. } => filename.clone(),
            InputSource::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// File name without its final extension
    pub fn stem(&self) -> Option<String> {
        let filename = self.filename();
        Path::new(&filename)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
    }

    /// Get a human-readable description of the source
    pub fn description(&self) -> String {
        match self {
            InputSource::Bytes { filename, data } => {
                format!("upload: {} ({} bytes)", filename, data.len())
            }
            InputSource::File(path) => format!("file: {}", path.display()),
        }
    }

    /// Size in bytes if known without reading the content
    pub fn estimated_size(&self) -> Option<u64> {
        match self {
            InputSource::Bytes { data, .. } => Some(data.len() as u64),
            InputSource::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
        }
    }

    /// Read the whole input, refusing more than `limit` bytes
    pub fn read(&self, limit: u64) -> ConversionResult<Vec<u8>> {
        match self {
            InputSource::Bytes { data, .. } => Ok(data.clone()),
            InputSource::File(path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    ConversionError::with_source(
                        ConversionErrorKind::invalid_format(format!(
                            "cannot open {}: {}",
                            path.display(),
                            e
                        )),
                        e,
                    )
                    .with_record(path.display().to_string())
                })?;
                limits::read_bounded(file, limit, "input")
            }
        }
    }
}
