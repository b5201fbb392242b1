//! Documents, sentences, tokens, and the character text they index.

use std::ops::Range;

use crate::colspec::ColumnSpecification;
use crate::error::{DataFormatError, ErrorKind};

use super::annotation::AnnotationIndex;

/// Document text addressed by Unicode scalar (char) offsets, as brat does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceText {
    text: String,
    /// Byte position of every char, plus the total byte length.
    bytes: Vec<usize>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { text, bytes }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in chars.
    pub fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The text of a char range, or `None` if it is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        if range.start > range.end || range.end > self.char_len() {
            return None;
        }
        Some(&self.text[self.bytes[range.start]..self.bytes[range.end]])
    }

    /// Char offset of the first occurrence of `needle` at or after char `from`.
    pub fn find_from(&self, needle: &str, from: usize) -> Option<usize> {
        let start = *self.bytes.get(from)?;
        let found = self.text[start..].find(needle)? + start;
        self.bytes.binary_search(&found).ok()
    }
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        SourceText::new(text)
    }
}

/// One OTPL row: a token span plus every raw cell of its line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    /// One-based input line; zero for tokens not read from a file.
    pub line: usize,
    pub text: String,
    /// The full row in colspec order, the TEXT cell included.
    pub columns: Vec<String>,
}

impl Token {
    pub fn new(text: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            start: 0,
            end: 0,
            line: 0,
            text: text.into(),
            columns,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    /// One-based line of the first token.
    pub line: usize,
    pub tokens: Vec<Token>,
}

impl Sentence {
    pub fn new(tokens: Vec<Token>) -> Self {
        let line = tokens.first().map_or(0, |t| t.line);
        Self {
            start: 0,
            end: 0,
            line,
            tokens,
        }
    }

    fn fit_to_tokens(&mut self) {
        if let (Some(first), Some(last)) = (self.tokens.first(), self.tokens.last()) {
            self.start = first.start;
            self.end = last.end;
        }
    }
}

/// A text with its tokenization and annotations.
///
/// Any of the three parts may be empty: a document read from OTPL has a
/// synthesized or aligned text and no annotations until it is converted, a
/// document read from brat has text and annotations but no sentences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub text: SourceText,
    /// Interpretation of every token's `columns`.
    pub colspec: ColumnSpecification,
    pub sentences: Vec<Sentence>,
    pub annotations: AnnotationIndex,
}

impl Document {
    /// Builds a document from untimed sentences by laying the tokens out in
    /// a new text, `token_gap` between tokens and `sentence_gap` between
    /// sentences.
    pub fn synthesize(
        colspec: ColumnSpecification,
        mut sentences: Vec<Sentence>,
        token_gap: &str,
        sentence_gap: &str,
    ) -> Self {
        let token_gap_len = token_gap.chars().count();
        let sentence_gap_len = sentence_gap.chars().count();
        let mut text = String::new();
        let mut offset = 0;

        for (s, sentence) in sentences.iter_mut().enumerate() {
            if s > 0 {
                text.push_str(sentence_gap);
                offset += sentence_gap_len;
            }
            for (t, token) in sentence.tokens.iter_mut().enumerate() {
                if t > 0 {
                    text.push_str(token_gap);
                    offset += token_gap_len;
                }
                token.start = offset;
                offset += token.text.chars().count();
                token.end = offset;
                text.push_str(&token.text);
            }
            sentence.start = sentence.tokens.first().map_or(offset, |t| t.start);
            sentence.end = offset;
        }

        Self {
            text: SourceText::new(text),
            colspec,
            sentences,
            annotations: AnnotationIndex::new(),
        }
    }

    /// Replaces the token offsets with those of the tokens' occurrences in
    /// `text`, searched in order.
    ///
    /// Anything between tokens is ignored, so the text may use any spacing
    /// or line breaks.
    pub fn align_to_text(&mut self, text: &str) -> Result<(), DataFormatError> {
        let source = SourceText::new(text);
        let mut cursor = 0;

        for (s, sentence) in self.sentences.iter_mut().enumerate() {
            for token in sentence.tokens.iter_mut() {
                let start = source.find_from(&token.text, cursor).ok_or_else(|| {
                    DataFormatError::new(
                        ErrorKind::TextMismatch,
                        format!(
                            "token '{}' not found in the text after offset {}",
                            token.text, cursor
                        ),
                    )
                    .at_line(token.line)
                    .in_sentence(s + 1)
                })?;
                token.start = start;
                token.end = start + token.text.chars().count();
                cursor = token.end;
            }
            sentence.fit_to_tokens();
        }

        self.text = source;
        Ok(())
    }

    /// Checks that every token's text is the source text at its offsets and
    /// that tokens are strictly increasing and contained in their sentences.
    pub fn check_tokens(&self) -> Result<(), DataFormatError> {
        let mut previous_end = 0;
        for (s, sentence) in self.sentences.iter().enumerate() {
            for token in &sentence.tokens {
                let located = |message: String| {
                    DataFormatError::new(ErrorKind::TextMismatch, message)
                        .at_line(token.line)
                        .in_sentence(s + 1)
                };
                if token.start < previous_end
                    || token.start < sentence.start
                    || token.end > sentence.end
                {
                    return Err(located(format!(
                        "token '{}' at [{}, {}) is out of order",
                        token.text, token.start, token.end
                    )));
                }
                match self.text.slice(token.span()) {
                    Some(found) if found == token.text => {}
                    Some(found) => {
                        return Err(located(format!(
                            "token '{}' does not match text '{}' at [{}, {})",
                            token.text, found, token.start, token.end
                        )))
                    }
                    None => {
                        return Err(located(format!(
                            "token '{}' at [{}, {}) lies outside the text",
                            token.text, token.start, token.end
                        )))
                    }
                }
                previous_end = token.end;
            }
        }
        Ok(())
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.tokens.len()).sum()
    }

    /// Index of the sentence whose range contains `[start, end)`.
    pub fn sentence_containing(&self, start: usize, end: usize) -> Option<usize> {
        let index = self.sentences.partition_point(|s| s.end <= start);
        self.sentences
            .get(index)
            .filter(|s| s.start <= start && end <= s.end)
            .map(|_| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: &[&str]) -> Sentence {
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(*w, vec![w.to_string()]).at_line(i + 1))
            .collect();
        Sentence::new(tokens)
    }

    fn synthesized() -> Document {
        Document::synthesize(
            ColumnSpecification::text_only(),
            vec![sentence(&["John", "Smith", "arrived"]), sentence(&["Bye", "."])],
            " ",
            "\n",
        )
    }

    #[test]
    fn test_source_text_uses_char_offsets() {
        let source = SourceText::new("Zürich is nice");
        assert_eq!(source.char_len(), 14);
        assert_eq!(source.slice(0..6), Some("Zürich"));
        assert_eq!(source.slice(7..9), Some("is"));
        assert_eq!(source.slice(10..20), None);
        assert_eq!(source.find_from("nice", 0), Some(10));
        assert_eq!(source.find_from("Zürich", 1), None);
    }

    #[test]
    fn test_synthesize_lays_out_tokens() {
        let doc = synthesized();
        assert_eq!(doc.text.as_str(), "John Smith arrived\nBye .");
        let tokens = &doc.sentences[0].tokens;
        assert_eq!(tokens[1].span(), 5..10);
        assert_eq!(doc.sentences[0].start, 0);
        assert_eq!(doc.sentences[0].end, 18);
        assert_eq!(doc.sentences[1].start, 19);
        assert_eq!(doc.sentences[1].tokens[1].span(), 23..24);
        assert!(doc.check_tokens().is_ok());
    }

    #[test]
    fn test_align_to_text_finds_tokens_in_order() {
        let mut doc = synthesized();
        doc.align_to_text("  John  Smith\narrived.\n\nBye .\n").unwrap();
        assert_eq!(doc.sentences[0].tokens[0].span(), 2..6);
        assert_eq!(doc.sentences[0].tokens[2].span(), 14..21);
        assert_eq!(doc.sentences[1].tokens[0].span(), 24..27);
        assert_eq!(doc.sentences[1].tokens[1].span(), 28..29);
        assert!(doc.check_tokens().is_ok());
    }

    #[test]
    fn test_align_to_text_reports_missing_token() {
        let mut doc = synthesized();
        let err = doc.align_to_text("John Smith left").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TextMismatch);
        assert_eq!(err.location.line, Some(3));
        assert_eq!(err.location.sentence, Some(1));
    }

    #[test]
    fn test_check_tokens_detects_mismatch() {
        let mut doc = synthesized();
        doc.sentences[0].tokens[0].text = "Joan".to_string();
        let err = doc.check_tokens().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TextMismatch);
    }

    #[test]
    fn test_sentence_containing() {
        let doc = synthesized();
        assert_eq!(doc.sentence_containing(0, 10), Some(0));
        assert_eq!(doc.sentence_containing(19, 24), Some(1));
        assert_eq!(doc.sentence_containing(5, 21), None);
        assert_eq!(doc.sentence_containing(18, 19), None);
    }
}
