//! Error types for otplc operations.
//!
//! Input problems are reported as [`DataFormatError`] values carrying a
//! closed [`ErrorKind`], so callers can match recoverable and fatal cases
//! the same way in strict and lenient mode. Configuration problems are
//! [`ConfigurationError`]s and can only occur while a
//! [`Configuration`](crate::config::Configuration) is being built.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The closed taxonomy of conversion failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A line has a different number of columns than the colspec declares.
    ColumnCountMismatch,
    /// Two or more colspec candidates explain a sample equally well.
    AmbiguousSpecification,
    /// No colspec candidate fits the observed (or declared) columns.
    NoMatchingSpecification,
    /// A colspec declaration itself is malformed.
    InvalidSpecification,
    /// An entity tag (or association item) breaks the tagging grammar.
    MalformedTagSequence,
    /// A relation or event points at an entity that does not exist.
    DanglingReference,
    /// An entity boundary falls strictly inside a token.
    EntitySpanMisaligned,
    /// An entity cannot be placed into any entity column without overlap.
    EntityOverlap,
    /// Token or covered text disagrees with the source text.
    TextMismatch,
    /// A brat standoff line cannot be parsed.
    InvalidStandoff,
    /// A label cannot be represented as a brat type name.
    InvalidLabel,
    /// The configuration is invalid.
    Configuration,
}

impl ErrorKind {
    /// Kinds that abort the current document even in lenient mode.
    ///
    /// Offsets are the only contract between the two formats, so a text
    /// mismatch is never repaired.
    pub fn is_always_fatal(&self) -> bool {
        matches!(self, ErrorKind::TextMismatch | ErrorKind::Configuration)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where in the input a problem was found.
///
/// Sentence numbers and line numbers are both one-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sentence, self.line) {
            (Some(s), Some(l)) => write!(f, "sentence {}, line {}", s, l),
            (Some(s), None) => write!(f, "sentence {}", s),
            (None, Some(l)) => write!(f, "line {}", l),
            (None, None) => write!(f, "document"),
        }
    }
}

/// A structured report of malformed or unconvertible input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[error("{kind} at {location}: {message}")]
pub struct DataFormatError {
    pub kind: ErrorKind,
    pub location: Location,
    pub message: String,
}

impl DataFormatError {
    /// Creates an error without location information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: Location::default(),
            message: message.into(),
        }
    }

    /// Attaches a one-based line number.
    pub fn at_line(mut self, line: usize) -> Self {
        self.location.line = Some(line);
        self
    }

    /// Attaches a one-based sentence number.
    pub fn in_sentence(mut self, sentence: usize) -> Self {
        self.location.sentence = Some(sentence);
        self
    }
}

/// Errors raised while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown tagging scheme '{0}' (supported: io, bio, bilou, bioes)")]
    UnknownScheme(String),

    #[error("unknown colspec '{name}': {reason}")]
    UnknownColspec { name: String, reason: String },

    #[error("both strict and lenient mode were requested")]
    ConflictingPolicy,

    #[error("writing {to} tags from {from} input is lossy; set allow_lossy to permit it")]
    LossyScheme { from: String, to: String },

    #[error("invalid {what} pattern '{pattern}': {source}")]
    InvalidPattern {
        what: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{what} must not contain {forbidden}")]
    Forbidden {
        what: &'static str,
        forbidden: &'static str,
    },

    #[error("labels: '{0}' is mapped more than once")]
    DuplicateLabel(String),

    #[error("sample_sentences must be at least 1")]
    EmptySample,

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// The main error type for otplc operations.
#[derive(Debug, Error)]
pub enum OtplcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("in {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DataFormatError,
    },

    #[error("Failed to write JSON report: {0}")]
    ReportWrite(#[source] serde_json::Error),

    #[error("{failed} of {total} document(s) failed to convert")]
    BatchFailed { failed: usize, total: usize },

    #[error("no input files found for {0}")]
    NoInput(PathBuf),

    #[error("failed to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl OtplcError {
    /// The error kind, for errors that stem from input or configuration.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OtplcError::DataFormat(e) | OtplcError::Document { source: e, .. } => Some(e.kind),
            OtplcError::Configuration(_) => Some(ErrorKind::Configuration),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    ///
    /// A failed batch exits with the number of failed documents.
    pub fn exit_code(&self) -> i32 {
        match self {
            OtplcError::BatchFailed { failed, .. } => (*failed).clamp(1, 100) as i32,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_location() {
        let err = DataFormatError::new(ErrorKind::ColumnCountMismatch, "line has 2 columns")
            .at_line(4)
            .in_sentence(2);
        assert_eq!(
            err.to_string(),
            "ColumnCountMismatch at sentence 2, line 4: line has 2 columns"
        );
    }

    #[test]
    fn test_only_text_mismatch_is_always_fatal_input_kind() {
        assert!(ErrorKind::TextMismatch.is_always_fatal());
        assert!(!ErrorKind::DanglingReference.is_always_fatal());
        assert!(!ErrorKind::MalformedTagSequence.is_always_fatal());
    }

    #[test]
    fn test_batch_exit_code_counts_failures() {
        let err = OtplcError::BatchFailed {
            failed: 3,
            total: 10,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_kind_of_wrapped_error() {
        let err: OtplcError = DataFormatError::new(ErrorKind::EntitySpanMisaligned, "x").into();
        assert_eq!(err.kind(), Some(ErrorKind::EntitySpanMisaligned));
    }
}
