//! Column specifications ("colspecs") for OTPL files.
//!
//! OTPL files carry no schema of their own, so every column's meaning is
//! declared by a [`ColumnSpecification`]: an ordered list of
//! [`ColumnRole`]s with exactly one [`ColumnRole::Text`] column. A colspec
//! is either named from the static [`registry`], written as a header line
//! of role keywords, or inferred from the data with [`guess_colspec`].
//!
//! # Header keywords
//!
//! | role | keyword | aliases |
//! |------|---------|---------|
//! | text | `TEXT` | `TOKEN` |
//! | entity tag | `ENTITY_TAG` | `ENTITY` |
//! | relation tag | `RELATION_TAG` | `RELATION` |
//! | event tag | `EVENT_TAG` | `EVENT` |
//! | feature | `FEATURE` | `POS_TAG` |

mod guess;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{DataFormatError, ErrorKind};

pub use guess::{guess_colspec, guess_segments, Guess};

/// Tracing target for colspec resolution and guessing.
pub const TRACING_TARGET_COLSPEC: &str = "otplc::colspec";

/// What the cells of one OTPL column mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnRole {
    /// The token itself.
    Text,
    /// Entity tags in the active tagging scheme.
    EntityTag,
    /// Binary relations between entities of the sentence.
    RelationTag,
    /// Events over entities of the sentence.
    EventTag,
    /// An opaque column carried along unchanged (POS tags, lemmas, ...).
    Feature,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 5] = [
        ColumnRole::Text,
        ColumnRole::EntityTag,
        ColumnRole::RelationTag,
        ColumnRole::EventTag,
        ColumnRole::Feature,
    ];

    /// The canonical header keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            ColumnRole::Text => "TEXT",
            ColumnRole::EntityTag => "ENTITY_TAG",
            ColumnRole::RelationTag => "RELATION_TAG",
            ColumnRole::EventTag => "EVENT_TAG",
            ColumnRole::Feature => "FEATURE",
        }
    }

    /// Parses a header keyword or alias.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "TEXT" | "TOKEN" => Some(ColumnRole::Text),
            "ENTITY_TAG" | "ENTITY" => Some(ColumnRole::EntityTag),
            "RELATION_TAG" | "RELATION" => Some(ColumnRole::RelationTag),
            "EVENT_TAG" | "EVENT" => Some(ColumnRole::EventTag),
            "FEATURE" | "POS_TAG" => Some(ColumnRole::Feature),
            _ => None,
        }
    }

    /// True for roles whose cells hold relation or event items.
    pub fn is_association(&self) -> bool {
        matches!(self, ColumnRole::RelationTag | ColumnRole::EventTag)
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// The ordered column roles of an OTPL file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnSpecification {
    roles: Vec<ColumnRole>,
    text: usize,
}

impl ColumnSpecification {
    /// Creates a colspec; exactly one role must be [`ColumnRole::Text`].
    ///
    /// RELATION_TAG and EVENT_TAG may each appear at most once; one cell
    /// holds any number of items.
    pub fn new(roles: Vec<ColumnRole>) -> Result<Self, DataFormatError> {
        for role in [ColumnRole::RelationTag, ColumnRole::EventTag] {
            if roles.iter().filter(|r| **r == role).count() > 1 {
                return Err(DataFormatError::new(
                    ErrorKind::InvalidSpecification,
                    format!("a colspec can have only one {} column", role),
                ));
            }
        }

        let mut text_columns = roles
            .iter()
            .enumerate()
            .filter(|(_, role)| **role == ColumnRole::Text)
            .map(|(i, _)| i);

        match (text_columns.next(), text_columns.next()) {
            (Some(text), None) => Ok(Self { roles, text }),
            (None, _) => Err(DataFormatError::new(
                ErrorKind::InvalidSpecification,
                "a colspec needs a TEXT column",
            )),
            (Some(_), Some(_)) => Err(DataFormatError::new(
                ErrorKind::InvalidSpecification,
                "a colspec must have exactly one TEXT column",
            )),
        }
    }

    /// The single-column colspec of bare tokenizations.
    pub fn text_only() -> Self {
        Self {
            roles: vec![ColumnRole::Text],
            text: 0,
        }
    }

    /// Parses a header line of whitespace-separated role keywords.
    pub fn from_header(line: &str) -> Result<Self, DataFormatError> {
        let roles = line
            .split_whitespace()
            .map(|word| {
                ColumnRole::from_keyword(word).ok_or_else(|| {
                    DataFormatError::new(
                        ErrorKind::InvalidSpecification,
                        format!("'{}' is not a column role", word),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(roles)
    }

    /// Number of columns.
    pub fn arity(&self) -> usize {
        self.roles.len()
    }

    pub fn roles(&self) -> &[ColumnRole] {
        &self.roles
    }

    /// Position of the TEXT column.
    pub fn text_column(&self) -> usize {
        self.text
    }

    /// Positions of all columns with `role`, left to right.
    pub fn columns(&self, role: ColumnRole) -> impl Iterator<Item = usize> + '_ {
        self.roles
            .iter()
            .enumerate()
            .filter(move |(_, r)| **r == role)
            .map(|(i, _)| i)
    }

    pub fn has(&self, role: ColumnRole) -> bool {
        self.roles.contains(&role)
    }

    /// True if the colspec has no column beyond TEXT and features.
    pub fn is_tokens_only(&self) -> bool {
        self.roles
            .iter()
            .all(|r| matches!(r, ColumnRole::Text | ColumnRole::Feature))
    }

    /// Pairs each cell of a line with its role.
    ///
    /// Fails with [`ErrorKind::ColumnCountMismatch`] unless the line has
    /// exactly [`arity`](Self::arity) cells.
    pub fn validate<'a, S: AsRef<str>>(
        &self,
        fields: &'a [S],
    ) -> Result<Vec<(ColumnRole, &'a str)>, DataFormatError> {
        if fields.len() != self.arity() {
            return Err(DataFormatError::new(
                ErrorKind::ColumnCountMismatch,
                format!(
                    "found {} column(s), colspec '{}' declares {}",
                    fields.len(),
                    self,
                    self.arity()
                ),
            ));
        }
        Ok(self
            .roles
            .iter()
            .copied()
            .zip(fields.iter().map(AsRef::as_ref))
            .collect())
    }
}

impl fmt::Display for ColumnSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, role) in self.roles.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(role.keyword())?;
        }
        Ok(())
    }
}

impl FromStr for ColumnSpecification {
    type Err = DataFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_header(s)
    }
}
