//! Error types and handling infrastructure for collection conversion

use std::fmt;

use crate::conversion::progress::Stage;

/// Boxed lower-level cause attached to a [`ConversionError`]
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error kinds for the conversion process
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionErrorKind {
    #[error("Unrecognized input format: {message}")]
    InvalidFormat { message: String },

    #[error("Corrupted file: {message}")]
    CorruptedFile { message: String },

    #[error("Unsupported collection version: {message}")]
    UnsupportedVersion { message: String },

    #[error("Parse error: {message}")]
    ParseError {
        message: String,
        line: Option<usize>,
    },

    #[error("Resource limit exceeded: {what} is {size} bytes (limit: {limit} bytes)")]
    ResourceLimitExceeded { what: String, size: u64, limit: u64 },

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Unexpected internal error: {message}")]
    Unknown { message: String },
}

impl ConversionErrorKind {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedFile {
            message: message.into(),
        }
    }

    pub fn unsupported_version(message: impl Into<String>) -> Self {
        Self::UnsupportedVersion {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::ParseError {
            message: message.into(),
            line,
        }
    }

    pub fn resource_limit(what: impl Into<String>, size: u64, limit: u64) -> Self {
        Self::ResourceLimitExceeded {
            what: what.into(),
            size,
            limit,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Stable name of the kind, used as the prefix of user messages
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "InvalidFormat",
            Self::CorruptedFile { .. } => "CorruptedFile",
            Self::UnsupportedVersion { .. } => "UnsupportedVersion",
            Self::ParseError { .. } => "ParseError",
            Self::ResourceLimitExceeded { .. } => "ResourceLimitExceeded",
            Self::Cancelled => "Cancelled",
            Self::Unknown { .. } => "Unknown",
        }
    }

    /// What the caller can try next
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => {
                "Supported inputs are .apkg, .colpkg, .anki2, .anki21, .anki21b and tab-separated .txt/.tsv files"
            }
            Self::CorruptedFile { .. } => {
                "Re-export the deck from Anki and try again; the file may be truncated or damaged"
            }
            Self::UnsupportedVersion { .. } => {
                "Export with the \"Support older Anki versions\" option enabled, or update this tool"
            }
            Self::ParseError { .. } => {
                "Check that the text file is tab-separated and that escapes use \\t, \\n or \\\\"
            }
            Self::ResourceLimitExceeded { .. } => {
                "Split the collection into smaller decks, or use the command-line tool with --tier batch for very large inputs"
            }
            Self::Cancelled => "Start the conversion again when ready",
            Self::Unknown { .. } => "Please report this problem together with the input file if possible",
        }
    }
}

/// Main error type for conversion operations
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ConversionError {
    pub kind: ConversionErrorKind,
    pub stage: Option<Stage>,
    /// Offending file or record, e.g. `card 1523` or `collection.anki21`
    pub record: Option<String>,
    #[source]
    pub source: Option<BoxedSource>,
}

impl ConversionError {
    pub fn new(kind: ConversionErrorKind) -> Self {
        Self {
            kind,
            stage: None,
            record: None,
            source: None,
        }
    }

    pub fn with_source(kind: ConversionErrorKind, source: impl Into<BoxedSource>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(kind)
        }
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ConversionErrorKind::invalid_format(message))
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::new(ConversionErrorKind::corrupted(message))
    }

    pub fn unsupported_version(message: impl Into<String>) -> Self {
        Self::new(ConversionErrorKind::unsupported_version(message))
    }

    pub fn parse(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::new(ConversionErrorKind::parse(message, line))
    }

    pub fn resource_limit(what: impl Into<String>, size: u64, limit: u64) -> Self {
        Self::new(ConversionErrorKind::resource_limit(what, size, limit))
    }

    pub fn cancelled() -> Self {
        Self::new(ConversionErrorKind::Cancelled)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ConversionErrorKind::unknown(message))
    }

    /// Attach the offending record or file name
    pub fn with_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    /// Record the stage the error surfaced in, keeping an earlier one if set
    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage.get_or_insert(stage);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ConversionErrorKind::Cancelled
    }

    /// Create a user-friendly error message with guidance
    pub fn user_message(&self) -> String {
        let mut message = format!("[{}] {}", self.kind.code(), self.kind);
        if let ConversionErrorKind::ParseError {
            line: Some(line), ..
        } = &self.kind
        {
            message.push_str(&format!(" at line {}", line));
        }
        match (&self.stage, &self.record) {
            (Some(stage), Some(record)) => {
                message.push_str(&format!(" (stage: {}, record: {})", stage, record))
            }
            (Some(stage), None) => message.push_str(&format!(" (stage: {})", stage)),
            (None, Some(record)) => message.push_str(&format!(" (record: {})", record)),
            (None, None) => {}
        }
        format!("{}\nTip: {}", message, self.kind.guidance())
    }
}

impl From<ConversionErrorKind> for ConversionError {
    fn from(kind: ConversionErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Position-aware error raised while reading delimited text
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for ConversionError {
    fn from(err: ParseError) -> Self {
        ConversionError::parse(err.message, err.line)
    }
}

/// Result type for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Convenience result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
