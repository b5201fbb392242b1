//! Inferring a colspec from OTPL data.
//!
//! A header line always wins. Otherwise the first sentences are sampled,
//! each column is profiled by its vocabulary, and every registry variant
//! of the observed arity is scored against the profiles:
//!
//! | role | fits | score |
//! |------|------|-------|
//! | TEXT | free text | 1 |
//! | TEXT | binary or empty column | 0 |
//! | ENTITY_TAG | entity tags only | 1 |
//! | RELATION_TAG / EVENT_TAG | matching items | 1 |
//! | RELATION_TAG / EVENT_TAG | empty column | 0 |
//! | FEATURE | anything | 0 |
//!
//! Any other pairing rules the variant out. A tie for the best score, or a
//! winner whose TEXT column is not free text, is ambiguous.

use std::collections::HashSet;

use crate::config::Configuration;
use crate::error::{DataFormatError, ErrorKind};
use crate::otpl::association::{self, Item};
use crate::otpl::reader::{segment, Segmented};
use crate::tagging::{EntityTag, TaggingScheme};

use super::registry::{self, Variant};
use super::{ColumnRole, ColumnSpecification, TRACING_TARGET_COLSPEC};

/// The outcome of [`guess_colspec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guess {
    pub colspec: ColumnSpecification,
    /// Registry name of the colspec, if it has one.
    pub variant: Option<&'static str>,
    /// True if the colspec was read from a header line.
    pub from_header: bool,
    pub score: u32,
}

/// What a sampled column looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Profile {
    /// Only empty markers.
    Empty,
    /// Only `O` and prefixed entity tags.
    EntityTags,
    /// Empty markers and association items, at least one item.
    Associations { relations: bool, events: bool },
    /// At most two distinct values over more than two rows.
    Binary,
    Free,
}

fn profile(cells: &[&str], empty_marker: &str) -> Profile {
    if cells.iter().all(|c| *c == empty_marker) {
        return Profile::Empty;
    }

    let tags_under = |scheme| cells.iter().all(|c| EntityTag::parse(c, scheme).is_ok());
    if tags_under(TaggingScheme::Bilou) || tags_under(TaggingScheme::Bioes) {
        return Profile::EntityTags;
    }

    let mut relations = false;
    let mut events = false;
    let associations = cells.iter().all(|cell| {
        match association::parse_cell(cell, empty_marker) {
            Ok(items) => {
                for item in items {
                    match item {
                        Item::Relation(_) => relations = true,
                        Item::Event(_) => events = true,
                    }
                }
                true
            }
            Err(_) => false,
        }
    });
    if associations {
        return Profile::Associations { relations, events };
    }

    let distinct: HashSet<&str> = cells.iter().copied().collect();
    if distinct.len() <= 2 && cells.len() > 2 {
        Profile::Binary
    } else {
        Profile::Free
    }
}

/// Score of a role on a column, or `None` if the role cannot fit.
fn fit(role: ColumnRole, profile: Profile) -> Option<u32> {
    match (role, profile) {
        (ColumnRole::Feature, _) => Some(0),
        (ColumnRole::Text, Profile::Free) => Some(1),
        (ColumnRole::Text, Profile::Binary | Profile::Empty) => Some(0),
        (ColumnRole::EntityTag, Profile::EntityTags) => Some(1),
        (ColumnRole::RelationTag | ColumnRole::EventTag, Profile::Empty) => Some(0),
        (ColumnRole::RelationTag, Profile::Associations { events: false, .. }) => Some(1),
        (ColumnRole::EventTag, Profile::Associations { relations: false, .. }) => Some(1),
        _ => None,
    }
}

fn score(variant: &Variant, profiles: &[Profile]) -> Option<u32> {
    variant
        .roles
        .iter()
        .zip(profiles)
        .map(|(role, profile)| fit(*role, *profile))
        .sum()
}

/// Guesses the colspec of OTPL text.
pub fn guess_colspec(otpl: &str, config: &Configuration) -> Result<Guess, DataFormatError> {
    let segmented = segment(otpl, config);
    guess_segments(&segmented, config)
}

/// Guesses the colspec of already segmented OTPL text.
pub fn guess_segments(
    segmented: &Segmented<'_>,
    config: &Configuration,
) -> Result<Guess, DataFormatError> {
    if let Some(header) = &segmented.header {
        tracing::debug!(
            target: TRACING_TARGET_COLSPEC,
            colspec = %header.colspec,
            "using colspec header"
        );
        return Ok(Guess {
            variant: registry::name_of(&header.colspec),
            colspec: header.colspec.clone(),
            from_header: true,
            score: 0,
        });
    }

    let rows: Vec<_> = segmented
        .segments
        .iter()
        .take(config.sample_sentences())
        .flat_map(|s| s.rows.iter())
        .collect();
    let Some(first) = rows.first() else {
        return Err(DataFormatError::new(
            ErrorKind::NoMatchingSpecification,
            "no token lines to guess a colspec from",
        ));
    };

    let arity = first.fields.len();
    if let Some(row) = rows.iter().find(|r| r.fields.len() != arity) {
        return Err(DataFormatError::new(
            ErrorKind::ColumnCountMismatch,
            format!(
                "found {} column(s), but line {} has {}",
                row.fields.len(),
                first.line,
                arity
            ),
        )
        .at_line(row.line));
    }

    let profiles: Vec<Profile> = (0..arity)
        .map(|column| {
            let cells: Vec<&str> = rows.iter().map(|r| r.fields[column]).collect();
            profile(&cells, config.empty_marker())
        })
        .collect();
    tracing::debug!(target: TRACING_TARGET_COLSPEC, ?profiles, rows = rows.len(), "profiled sample");

    let candidates: Vec<_> = registry::variants()
        .iter()
        .filter(|v| v.arity() == arity)
        .collect();
    if candidates.is_empty() {
        return Err(DataFormatError::new(
            ErrorKind::NoMatchingSpecification,
            format!("no registered colspec has {} columns", arity),
        ));
    }

    let mut scored: Vec<(&Variant, u32)> = candidates
        .into_iter()
        .filter_map(|v| score(v, &profiles).map(|s| (v, s)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let (best, best_score) = match scored.as_slice() {
        [] => {
            return Err(DataFormatError::new(
                ErrorKind::NoMatchingSpecification,
                format!(
                    "no registered {}-column colspec fits the sampled columns",
                    arity
                ),
            ))
        }
        [(a, s), (b, t), ..] if s == t => {
            return Err(DataFormatError::new(
                ErrorKind::AmbiguousSpecification,
                format!(
                    "'{}' and '{}' fit the sample equally well; configure a colspec",
                    a.name, b.name
                ),
            ))
        }
        [(best, s), ..] => (*best, *s),
    };

    if profiles[0] != Profile::Free {
        return Err(DataFormatError::new(
            ErrorKind::AmbiguousSpecification,
            format!(
                "'{}' fits best, but its TEXT column does not look like free text",
                best.name
            ),
        ));
    }

    tracing::info!(
        target: TRACING_TARGET_COLSPEC,
        variant = best.name,
        score = best_score,
        "guessed colspec"
    );
    Ok(Guess {
        colspec: best.colspec(),
        variant: Some(best.name),
        from_header: false,
        score: best_score,
    })
}
