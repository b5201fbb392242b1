//! Serializing a [`Document`]'s token rows as OTPL text.

use crate::config::Configuration;
use crate::model::Document;

/// Renders every sentence as rows of `output_delimiter`-joined cells, with
/// one blank line between sentences and, if configured, a colspec header
/// segment first.
pub fn write(document: &Document, config: &Configuration) -> String {
    let mut out = String::new();

    if config.write_header() {
        out.push_str(&document.colspec.to_string());
        out.push_str("\n\n");
    }

    for (s, sentence) in document.sentences.iter().enumerate() {
        if s > 0 {
            out.push('\n');
        }
        for token in &sentence.tokens {
            out.push_str(&token.columns.join(config.output_delimiter()));
            out.push('\n');
        }
    }

    out
}
