//! Reading OTPL text into a [`Document`].
//!
//! Reading happens in two steps. [`segment`] splits the text into lines
//! (`\n`, `\r\n` or `\r`), drops filtered lines, recognizes an optional
//! colspec header, resolves the column separator and groups the rows into
//! blank-line-delimited sentences. [`read`] then checks every row against
//! a colspec, validates (and in lenient mode repairs) the entity tag
//! columns and lays the tokens out in a synthesized text.

use crate::colspec::{guess_segments, ColumnRole, ColumnSpecification, Guess};
use crate::config::{Configuration, Separator};
use crate::error::{DataFormatError, ErrorKind};
use crate::model::{Document, Sentence, Token};
use crate::tagging;

/// Tracing target for OTPL reading.
pub const TRACING_TARGET_READER: &str = "otplc::reader";

/// A colspec header line found at the top of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub line: usize,
    pub colspec: ColumnSpecification,
}

/// One non-blank, unfiltered line split into cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRow<'a> {
    pub line: usize,
    pub fields: Vec<&'a str>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSegment<'a> {
    pub rows: Vec<RawRow<'a>>,
}

/// OTPL text split into sentences of rows, before any interpretation.
#[derive(Clone, Debug)]
pub struct Segmented<'a> {
    pub header: Option<Header>,
    /// The separator used, never [`Separator::Auto`].
    pub separator: Separator,
    pub segments: Vec<RawSegment<'a>>,
}

impl Segmented<'_> {
    /// Column count of the first row, if there is one.
    pub fn arity(&self) -> Option<usize> {
        self.segments
            .first()
            .and_then(|s| s.rows.first())
            .map(|r| r.fields.len())
    }
}

/// The result of [`read`].
#[derive(Clone, Debug)]
pub struct Reading {
    pub document: Document,
    /// Problems recovered from in lenient mode.
    pub warnings: Vec<DataFormatError>,
    /// Set if the colspec was guessed rather than configured.
    pub guess: Option<Guess>,
}

/// Splits text at `\n`, `\r\n` and `\r`.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                start = i + 1;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Splits OTPL text into sentences of raw rows.
///
/// A header is recognized only if it is alone in the first segment.
pub fn segment<'a>(text: &'a str, config: &Configuration) -> Segmented<'a> {
    let lines: Vec<(usize, &str)> = split_lines(text)
        .into_iter()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !config.is_filtered(line))
        .collect();

    let mut groups: Vec<Vec<(usize, &str)>> = Vec::new();
    let mut current = Vec::new();
    for (number, line) in lines {
        if is_blank(line) {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push((number, line));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut header = None;
    if let Some([(line, candidate)]) = groups.first().map(Vec::as_slice) {
        if let Ok(colspec) = ColumnSpecification::from_header(candidate) {
            header = Some(Header {
                line: *line,
                colspec,
            });
        }
    }
    if header.is_some() {
        groups.remove(0);
    }

    let separator = config
        .separator()
        .resolve(groups.iter().flatten().map(|(_, line)| *line));

    let segments = groups
        .into_iter()
        .map(|group| RawSegment {
            rows: group
                .into_iter()
                .map(|(line, text)| RawRow {
                    line,
                    fields: separator.split(text),
                })
                .collect(),
        })
        .collect();

    Segmented {
        header,
        separator,
        segments,
    }
}

/// Reads OTPL text with a known colspec.
///
/// In strict mode the first column count mismatch or malformed tag
/// sequence aborts reading. In lenient mode a sentence with a mismatched
/// row is skipped and a malformed entity column is rewritten canonically
/// (see [`tagging::repair`]); both are recorded as warnings.
pub fn read(
    text: &str,
    colspec: &ColumnSpecification,
    config: &Configuration,
) -> Result<Reading, DataFormatError> {
    read_segments(&segment(text, config), colspec, config)
}

/// Reads OTPL text with the configured colspec, guessing one if none is
/// configured.
pub fn read_auto(text: &str, config: &Configuration) -> Result<Reading, DataFormatError> {
    let segmented = segment(text, config);
    match config.colspec() {
        Some(colspec) => read_segments(&segmented, colspec, config),
        None => {
            let guess = guess_segments(&segmented, config)?;
            let mut reading = read_segments(&segmented, &guess.colspec, config)?;
            reading.guess = Some(guess);
            Ok(reading)
        }
    }
}

pub fn read_segments(
    segmented: &Segmented<'_>,
    colspec: &ColumnSpecification,
    config: &Configuration,
) -> Result<Reading, DataFormatError> {
    let policy = config.policy();
    let mut warnings = Vec::new();

    if let Some(header) = &segmented.header {
        if header.colspec != *colspec {
            let err = DataFormatError::new(
                ErrorKind::NoMatchingSpecification,
                format!(
                    "header declares '{}', but colspec '{}' is in use",
                    header.colspec, colspec
                ),
            )
            .at_line(header.line);
            policy.recover(err, &mut warnings)?;
        }
    }

    let text_column = colspec.text_column();
    let entity_columns: Vec<usize> = colspec.columns(ColumnRole::EntityTag).collect();
    let mut sentences = Vec::with_capacity(segmented.segments.len());

    for (s, raw) in segmented.segments.iter().enumerate() {
        let number = s + 1;

        // a blank TEXT cell is a column lost to the separator
        let mismatch = raw.rows.iter().find_map(|row| {
            let err = match colspec.validate(&row.fields) {
                Err(err) => err,
                Ok(_) if row.fields[text_column].trim().is_empty() => DataFormatError::new(
                    ErrorKind::ColumnCountMismatch,
                    format!("column {} (TEXT) is empty", text_column + 1),
                ),
                Ok(_) => return None,
            };
            Some(err.at_line(row.line))
        });
        if let Some(err) = mismatch {
            policy.recover(err.in_sentence(number), &mut warnings)?;
            continue;
        }

        let mut rows: Vec<Vec<String>> = raw
            .rows
            .iter()
            .map(|row| row.fields.iter().map(|f| f.to_string()).collect())
            .collect();

        for &column in &entity_columns {
            let tags: Vec<&str> = rows.iter().map(|r| r[column].as_str()).collect();
            let (repaired, problems) = tagging::repair(&tags, config.scheme());
            if problems.is_empty() {
                continue;
            }
            for problem in problems {
                let err = DataFormatError::new(
                    ErrorKind::MalformedTagSequence,
                    format!("column {}: {}", column + 1, problem.message),
                )
                .at_line(raw.rows[problem.index].line)
                .in_sentence(number);
                policy.recover(err, &mut warnings)?;
            }
            for (row, tag) in rows.iter_mut().zip(repaired) {
                row[column] = tag;
            }
        }

        let tokens = rows
            .into_iter()
            .zip(&raw.rows)
            .map(|(columns, row)| Token::new(columns[text_column].clone(), columns).at_line(row.line))
            .collect();
        sentences.push(Sentence::new(tokens));
    }

    let document = Document::synthesize(
        colspec.clone(),
        sentences,
        config.token_gap(),
        config.sentence_gap(),
    );
    tracing::debug!(
        target: TRACING_TARGET_READER,
        colspec = %colspec,
        separator = %segmented.separator,
        sentences = document.sentences.len(),
        tokens = document.token_count(),
        warnings = warnings.len(),
        "read OTPL"
    );

    Ok(Reading {
        document,
        warnings,
        guess: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colspec::registry;

    fn entities() -> ColumnSpecification {
        registry::lookup("entities").unwrap().colspec()
    }

    fn lenient() -> Configuration {
        Configuration::builder().lenient(true).build().unwrap()
    }

    #[test]
    fn test_split_lines_handles_all_line_endings() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n\n"), vec!["a", ""]);
        assert_eq!(split_lines("a\r\n\r\nb\n"), vec!["a", "", "b"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_segment_groups_sentences_and_header() {
        let text = "TEXT ENTITY_TAG\n\nJohn\tB-PER\nSmith\tI-PER\n\n\nBye\tO\n";
        let segmented = segment(text, &Configuration::default());
        assert_eq!(segmented.header.as_ref().unwrap().line, 1);
        assert_eq!(segmented.segments.len(), 2);
        assert_eq!(segmented.segments[0].rows[1].line, 4);
        assert_eq!(segmented.segments[1].rows[0].fields, vec!["Bye", "O"]);
        assert!(matches!(segmented.separator, Separator::Tab));
    }

    #[test]
    fn test_header_needs_its_own_segment() {
        let segmented = segment("TEXT\nJohn\n", &Configuration::default());
        assert!(segmented.header.is_none());
        assert_eq!(segmented.segments[0].rows.len(), 2);
    }

    #[test]
    fn test_filter_drops_lines() {
        let config = Configuration::builder().filter("^#").build().unwrap();
        let segmented = segment("# doc 1\nJohn B-PER\n# note\nleft O\n", &config);
        assert_eq!(segmented.segments.len(), 1);
        assert_eq!(segmented.segments[0].rows.len(), 2);
        assert_eq!(segmented.segments[0].rows[1].line, 4);
    }

    #[test]
    fn test_read_synthesizes_offsets() {
        let reading = read(
            "John\tB-PER\nSmith\tI-PER\narrived\tO\n\nBye\tO\n",
            &entities(),
            &Configuration::default(),
        )
        .unwrap();
        let doc = reading.document;
        assert!(reading.warnings.is_empty());
        assert_eq!(doc.text.as_str(), "John Smith arrived\nBye");
        assert_eq!(doc.sentences.len(), 2);
        let arrived = &doc.sentences[0].tokens[2];
        assert_eq!((arrived.start, arrived.end, arrived.line), (11, 18, 3));
        assert_eq!(arrived.columns, vec!["arrived", "O"]);
        assert_eq!(doc.sentences[1].tokens[0].span(), 19..22);
    }

    #[test]
    fn test_column_mismatch_strict_and_lenient() {
        let text = "John\tB-PER\nSmith\n\nBye\tO\n";
        let err = read(text, &entities(), &Configuration::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnCountMismatch);
        assert_eq!(err.location.line, Some(2));
        assert_eq!(err.location.sentence, Some(1));

        let reading = read(text, &entities(), &lenient()).unwrap();
        assert_eq!(reading.warnings.len(), 1);
        assert_eq!(reading.document.sentences.len(), 1);
        assert_eq!(reading.document.text.as_str(), "Bye");
    }

    #[test]
    fn test_empty_text_cell() {
        let text = "a\tO\n\tB-X\nb\tO\n\nc\tO\n";
        let err = read(text, &entities(), &Configuration::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnCountMismatch);
        assert_eq!(err.location.line, Some(2));
        assert!(err.message.contains("TEXT"));

        let reading = read(text, &entities(), &lenient()).unwrap();
        assert_eq!(reading.warnings.len(), 1);
        assert_eq!(reading.document.text.as_str(), "c");
    }

    #[test]
    fn test_malformed_tags_strict_and_lenient() {
        let text = "the O\nSmith I-PER\nfamily I-PER\n";
        let err = read(text, &entities(), &Configuration::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedTagSequence);
        assert_eq!(err.location.line, Some(2));

        let reading = read(text, &entities(), &lenient()).unwrap();
        assert_eq!(reading.warnings.len(), 1);
        let tags: Vec<_> = reading.document.sentences[0]
            .tokens
            .iter()
            .map(|t| t.columns[1].as_str())
            .collect();
        assert_eq!(tags, vec!["O", "B-PER", "I-PER"]);
    }

    #[test]
    fn test_contradicting_header() {
        let text = "TEXT FEATURE\n\nJohn NNP\n";
        let err = read(text, &entities(), &Configuration::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoMatchingSpecification);
        assert_eq!(err.location.line, Some(1));
    }

    #[test]
    fn test_read_auto_guesses() {
        let reading = read_auto("John B-PER\nleft O\n", &Configuration::default()).unwrap();
        assert_eq!(reading.guess.unwrap().variant, Some("entities"));
        assert_eq!(reading.document.colspec, entities());

        let config = Configuration::builder().colspec("tokens").build().unwrap();
        let reading = read_auto("John NNP\nleft VBD\n", &config).unwrap();
        assert!(reading.guess.is_none());
    }
}
