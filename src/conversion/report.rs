//! Conversion report types for tracking lossiness and policy decisions.
//!
//! Every document conversion produces a [`ConversionReport`]: counts on
//! both sides, the input problems recovered in lenient mode, and notes on
//! decisions the converter made on its own (a guessed colspec, a
//! synthesized text).

use serde::Serialize;
use std::fmt;

use crate::error::{DataFormatError, ErrorKind, Location};
use crate::model::Document;

/// A report generated during format conversion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub from: String,
    /// Target format name.
    pub to: String,
    pub input: ConversionCounts,
    pub output: ConversionCounts,
    pub issues: Vec<ConversionIssue>,
}

impl ConversionReport {
    /// Create a new empty report for a conversion between formats.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    /// Adds one warning per recovered input problem.
    pub fn add_recovered(&mut self, warnings: impl IntoIterator<Item = DataFormatError>) {
        self.issues
            .extend(warnings.into_iter().map(ConversionIssue::recovered));
    }

    /// Count of warning-level issues (true lossiness).
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning)
            .count()
    }

    /// Count of info-level issues (policy decisions, notes).
    pub fn info_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Info)
            .count()
    }

    /// Returns true if this conversion lost information.
    pub fn is_lossy(&self) -> bool {
        self.warning_count() > 0
    }

    /// Issues of the given code.
    pub fn issues_with(&self, code: ConversionIssueCode) -> impl Iterator<Item = &ConversionIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {}", self.input)?;

        if self.output != self.input {
            writeln!(f, "  output: {}", self.output)?;
        }

        let sections = [
            (ConversionSeverity::Warning, "Warnings"),
            (ConversionSeverity::Info, "Notes"),
        ];
        for (severity, title) in sections {
            let issues: Vec<_> = self
                .issues
                .iter()
                .filter(|i| i.severity == severity)
                .collect();
            if issues.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{} ({}):", title, issues.len())?;
            for issue in issues {
                writeln!(f, "  - {}", issue)?;
            }
        }

        Ok(())
    }
}

/// Counts of document elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionCounts {
    pub sentences: usize,
    pub tokens: usize,
    pub entities: usize,
    pub relations: usize,
    pub events: usize,
}

impl ConversionCounts {
    /// Counts of a document's tokenization and annotation index.
    pub fn of(document: &Document) -> Self {
        Self {
            sentences: document.sentences.len(),
            tokens: document.token_count(),
            entities: document.annotations.entities.len(),
            relations: document.annotations.relations.len(),
            events: document.annotations.events.len(),
        }
    }
}

impl fmt::Display for ConversionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sentences, {} tokens, {} entities, {} relations, {} events",
            self.sentences, self.tokens, self.entities, self.relations, self.events
        )
    }
}

/// A single issue discovered during conversion.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
    /// The input problem behind a recovered issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ConversionIssue {
    /// Create a warning-level issue (indicates lossiness).
    pub fn warning(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code,
            message: message.into(),
            kind: None,
            location: None,
        }
    }

    /// Create an info-level issue (policy note, does not block).
    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Info,
            code,
            message: message.into(),
            kind: None,
            location: None,
        }
    }

    /// A warning for an input problem skipped or repaired in lenient mode.
    pub fn recovered(err: DataFormatError) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code: ConversionIssueCode::RecoveredInput,
            message: err.message,
            kind: Some(err.kind),
            location: Some(err.location),
        }
    }
}

impl fmt::Display for ConversionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.location) {
            (Some(kind), Some(location)) => write!(f, "{} at {}: {}", kind, location, self.message),
            (Some(kind), None) => write!(f, "{}: {}", kind, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Severity level for conversion issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// Information was lost or input was repaired.
    Warning,
    /// A policy decision; nothing was lost.
    Info,
}

/// Stable issue codes for programmatic consumption.
///
/// These codes are part of the JSON report and should remain stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    /// A malformed line, tag, reference or span was skipped or repaired.
    RecoveredInput,
    /// Attributes, normalizations, notes and equivalences have no OTPL form.
    DropSupplements,
    /// The target colspec has no RELATION_TAG column.
    DropRelations,
    /// The target colspec has no EVENT_TAG column.
    DropEvents,
    /// The target colspec has no ENTITY_TAG column.
    DropEntities,
    /// The output tagging scheme is coarser than the input scheme.
    LossyOutputScheme,

    /// The OTPL input had no accompanying text; offsets were synthesized.
    SynthesizedText,
    /// The colspec was inferred from the data.
    GuessedColspec,
    /// The colspec is the smallest registry variant covering the annotations.
    CoveringColspec,
}
