//! Entity tag grammar and tagging-scheme state machine.
//!
//! An ENTITY_TAG cell holds either `O` or `<P>-<LABEL>[#<GROUP>]`, where the
//! prefix letter `P` depends on the active [`TaggingScheme`]:
//!
//! | scheme  | begin | inside | last | unit |
//! |---------|-------|--------|------|------|
//! | `io`    |       | `I`    |      |      |
//! | `bio`   | `B`   | `I`    |      |      |
//! | `bilou` | `B`   | `I`    | `L`  | `U`  |
//! | `bioes` | `B`   | `I`    | `E`  | `S`  |
//!
//! # Discontinuous entities
//!
//! A `#<GROUP>` suffix binds tags of one label inside one sentence and one
//! column to the same entity. A begin tag of an already-seen
//! `(label, group)` pair, or an inside tag that follows a gap, opens a new
//! fragment of that entity instead of a new entity:
//!
//! ```text
//! the     O
//! left    B-Part#1
//! and     O
//! right   B-Part#1      <- second fragment of the same entity
//! kidney  I-Part#1
//! ```
//!
//! The encoder only emits groups for multi-fragment entities, numbers them
//! from 1 in order of first appearance, and always opens a fragment with the
//! begin-class tag, so decoding what it wrote is lossless for every scheme
//! except `io`.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// The tag written for tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// Convention for encoding span boundaries in a per-token tag column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggingScheme {
    /// Inside/outside only; adjacent entities of one label merge.
    Io,
    /// Begin/inside/outside (IOB2).
    #[default]
    Bio,
    /// Begin/inside/last/outside/unit.
    Bilou,
    /// Begin/inside/end/outside/single.
    Bioes,
}

impl TaggingScheme {
    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            TaggingScheme::Io => "io",
            TaggingScheme::Bio => "bio",
            TaggingScheme::Bilou => "bilou",
            TaggingScheme::Bioes => "bioes",
        }
    }

    /// True if writing with `self` cannot preserve every span `other` can express.
    pub fn is_coarser_than(&self, other: TaggingScheme) -> bool {
        *self == TaggingScheme::Io && other != TaggingScheme::Io
    }

    fn has_end_tags(&self) -> bool {
        matches!(self, TaggingScheme::Bilou | TaggingScheme::Bioes)
    }

    fn letter(&self, prefix: Prefix) -> char {
        match (self, prefix) {
            (TaggingScheme::Io, _) => 'I',
            (_, Prefix::Begin) => 'B',
            (_, Prefix::Inside) => 'I',
            (TaggingScheme::Bilou, Prefix::Last) => 'L',
            (TaggingScheme::Bilou, Prefix::Unit) => 'U',
            (TaggingScheme::Bioes, Prefix::Last) => 'E',
            (TaggingScheme::Bioes, Prefix::Unit) => 'S',
            (TaggingScheme::Bio, Prefix::Last) => 'I',
            (TaggingScheme::Bio, Prefix::Unit) => 'B',
        }
    }

    fn prefix(&self, letter: char) -> Option<Prefix> {
        match (self, letter) {
            (TaggingScheme::Io, 'I') => Some(Prefix::Inside),
            (TaggingScheme::Io, _) => None,
            (_, 'B') => Some(Prefix::Begin),
            (_, 'I') => Some(Prefix::Inside),
            (TaggingScheme::Bilou, 'L') | (TaggingScheme::Bioes, 'E') => Some(Prefix::Last),
            (TaggingScheme::Bilou, 'U') | (TaggingScheme::Bioes, 'S') => Some(Prefix::Unit),
            _ => None,
        }
    }
}

impl fmt::Display for TaggingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaggingScheme {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "io" => Ok(TaggingScheme::Io),
            "bio" | "iob2" => Ok(TaggingScheme::Bio),
            "bilou" => Ok(TaggingScheme::Bilou),
            "bioes" | "iobes" => Ok(TaggingScheme::Bioes),
            _ => Err(ConfigurationError::UnknownScheme(s.to_string())),
        }
    }
}

/// Position of a token within an entity fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prefix {
    Begin,
    Inside,
    Last,
    Unit,
}

/// A parsed, non-outside entity tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityTag {
    pub prefix: Prefix,
    pub label: String,
    pub group: Option<u32>,
}

impl EntityTag {
    /// Parses a raw cell; `Ok(None)` is the outside tag.
    pub fn parse(raw: &str, scheme: TaggingScheme) -> Result<Option<Self>, String> {
        if raw == OUTSIDE {
            return Ok(None);
        }

        let mut chars = raw.chars();
        let (Some(letter), Some('-')) = (chars.next(), chars.next()) else {
            return Err(format!("'{}' is not an entity tag", raw));
        };
        let prefix = scheme
            .prefix(letter)
            .ok_or_else(|| format!("'{}' uses a prefix the {} scheme lacks", raw, scheme))?;

        let rest = chars.as_str();
        let (label, group) = match rest.split_once('#') {
            Some((label, group)) => {
                let group = group
                    .parse::<u32>()
                    .ok()
                    .filter(|g| *g > 0)
                    .ok_or_else(|| format!("'{}' has an invalid group marker", raw))?;
                (label, Some(group))
            }
            None => (rest, None),
        };

        if label.is_empty() {
            return Err(format!("'{}' has no label", raw));
        }

        Ok(Some(Self {
            prefix,
            label: label.to_string(),
            group,
        }))
    }

    /// Renders the tag with the letters of `scheme`.
    pub fn render(&self, scheme: TaggingScheme) -> String {
        match self.group {
            Some(group) => format!("{}-{}#{}", scheme.letter(self.prefix), self.label, group),
            None => format!("{}-{}", scheme.letter(self.prefix), self.label),
        }
    }
}

/// An entity decoded from one tag column, in token indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSpan {
    pub label: String,
    pub group: Option<u32>,
    /// Half-open token ranges, in order of appearance.
    pub fragments: Vec<Range<usize>>,
}

impl TagSpan {
    pub fn new(label: impl Into<String>, fragments: Vec<Range<usize>>) -> Self {
        Self {
            label: label.into(),
            group: None,
            fragments,
        }
    }

    /// Index of the first token covered by the span.
    pub fn first_token(&self) -> usize {
        self.fragments.first().map(|f| f.start).unwrap_or(0)
    }
}

/// A tag-sequence violation at a token index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagProblem {
    pub index: usize,
    pub message: String,
}

/// The outcome of scanning a tag column.
///
/// `spans` is always a best-effort reading, even when `problems` is not empty.
#[derive(Clone, Debug, Default)]
pub struct Decoded {
    pub spans: Vec<TagSpan>,
    pub problems: Vec<TagProblem>,
}

struct Open {
    span: usize,
    start: usize,
}

struct Decoder<'a> {
    scheme: TaggingScheme,
    spans: Vec<TagSpan>,
    groups: HashMap<(&'a str, u32), usize>,
    problems: Vec<TagProblem>,
    open: Option<Open>,
}

impl<'a> Decoder<'a> {
    fn close(&mut self, end: usize, terminated: bool) {
        let Some(open) = self.open.take() else {
            return;
        };
        let span = &mut self.spans[open.span];
        span.fragments.push(open.start..end);

        if self.scheme.has_end_tags() && !terminated {
            self.problems.push(TagProblem {
                index: end - 1,
                message: format!("entity '{}' is not terminated", span.label),
            });
        }
    }

    fn start(&mut self, label: &'a str, group: Option<u32>, index: usize) {
        let known = group.and_then(|g| self.groups.get(&(label, g)).copied());
        let span = match known {
            Some(span) => span,
            None => {
                self.spans.push(TagSpan {
                    label: label.to_string(),
                    group,
                    fragments: Vec::new(),
                });
                let span = self.spans.len() - 1;
                if let Some(g) = group {
                    self.groups.insert((label, g), span);
                }
                span
            }
        };
        self.open = Some(Open { span, start: index });
    }

    fn continues(&self, label: &str, group: Option<u32>) -> bool {
        self.open.as_ref().is_some_and(|open| {
            let span = &self.spans[open.span];
            span.label == label && span.group == group
        })
    }

    fn knows(&self, label: &str, group: Option<u32>) -> bool {
        group.is_some_and(|g| self.groups.contains_key(&(label, g)))
    }
}

/// Scans a tag column left to right and reconstructs its entities.
///
/// States are OUTSIDE and INSIDE(label): a begin tag opens a fragment, an
/// inside tag of the open label extends it, and anything else closes it.
pub fn decode<S: AsRef<str>>(tags: &[S], scheme: TaggingScheme) -> Decoded {
    let mut parsed = Vec::with_capacity(tags.len());
    let mut problems = Vec::new();
    for (index, raw) in tags.iter().enumerate() {
        match EntityTag::parse(raw.as_ref(), scheme) {
            Ok(tag) => parsed.push(tag),
            Err(message) => {
                problems.push(TagProblem { index, message });
                parsed.push(None);
            }
        }
    }

    let mut decoder = Decoder {
        scheme,
        spans: Vec::new(),
        groups: HashMap::new(),
        problems,
        open: None,
    };

    for (index, tag) in parsed.iter().enumerate() {
        let Some(tag) = tag else {
            decoder.close(index, false);
            continue;
        };
        let label = tag.label.as_str();

        match tag.prefix {
            Prefix::Begin => {
                decoder.close(index, false);
                decoder.start(label, tag.group, index);
            }
            Prefix::Unit => {
                decoder.close(index, false);
                decoder.start(label, tag.group, index);
                decoder.close(index + 1, true);
            }
            Prefix::Inside | Prefix::Last => {
                if !decoder.continues(label, tag.group) {
                    decoder.close(index, false);
                    if scheme != TaggingScheme::Io && !decoder.knows(label, tag.group) {
                        decoder.problems.push(TagProblem {
                            index,
                            message: format!(
                                "continuation tag '{}' has no matching begin tag",
                                tags[index].as_ref()
                            ),
                        });
                    }
                    decoder.start(label, tag.group, index);
                }
                if tag.prefix == Prefix::Last {
                    decoder.close(index + 1, true);
                }
            }
        }
    }
    decoder.close(tags.len(), false);

    let mut problems = decoder.problems;
    problems.sort_by_key(|p| p.index);
    Decoded {
        spans: decoder.spans,
        problems,
    }
}

/// Assigns discontinuity groups: 1.. to multi-fragment spans, none otherwise.
pub fn number_groups(spans: &mut [TagSpan]) {
    let mut next = 1;
    for span in spans.iter_mut() {
        if span.fragments.len() > 1 {
            span.group = Some(next);
            next += 1;
        } else {
            span.group = None;
        }
    }
}

/// Renders spans as a tag column of `len` tokens.
///
/// Spans must not share tokens; fragments beyond `len` are ignored.
pub fn encode(spans: &[TagSpan], len: usize, scheme: TaggingScheme) -> Vec<String> {
    let mut tags = vec![OUTSIDE.to_string(); len];

    for span in spans {
        for fragment in &span.fragments {
            for index in fragment.clone() {
                let prefix = if fragment.len() == 1 {
                    Prefix::Unit
                } else if index == fragment.start {
                    Prefix::Begin
                } else if index + 1 == fragment.end {
                    Prefix::Last
                } else {
                    Prefix::Inside
                };
                let tag = EntityTag {
                    prefix,
                    label: span.label.clone(),
                    group: span.group,
                };
                if let Some(slot) = tags.get_mut(index) {
                    *slot = tag.render(scheme);
                }
            }
        }
    }

    tags
}

/// Decodes a column and, if it is malformed, rewrites it canonically.
///
/// Orphan continuation tags become begin tags of a new entity, unparseable
/// cells become `O`, and unterminated spans are closed.
pub fn repair<S: AsRef<str>>(tags: &[S], scheme: TaggingScheme) -> (Vec<String>, Vec<TagProblem>) {
    let decoded = decode(tags, scheme);
    if decoded.problems.is_empty() {
        return (
            tags.iter().map(|t| t.as_ref().to_string()).collect(),
            decoded.problems,
        );
    }

    let mut spans = decoded.spans;
    number_groups(&mut spans);
    (encode(&spans, tags.len(), scheme), decoded.problems)
}
