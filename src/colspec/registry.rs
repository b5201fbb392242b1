//! The static table of named colspec variants.
//!
//! The table is immutable, so it can be read from any number of conversion
//! threads. Variant names are accepted wherever a colspec is configured.

use crate::error::ConfigurationError;

use super::{ColumnRole, ColumnSpecification};

use super::ColumnRole::{EntityTag as E, EventTag as V, Feature as F, RelationTag as R, Text as T};

/// A named colspec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variant {
    pub name: &'static str,
    pub description: &'static str,
    pub roles: &'static [ColumnRole],
}

impl Variant {
    pub fn colspec(&self) -> ColumnSpecification {
        ColumnSpecification {
            roles: self.roles.to_vec(),
            text: 0,
        }
    }

    pub fn arity(&self) -> usize {
        self.roles.len()
    }
}

static VARIANTS: &[Variant] = &[
    Variant {
        name: "tokens",
        description: "token and one feature (e.g. a POS tag)",
        roles: &[T, F],
    },
    Variant {
        name: "entities",
        description: "token and entity tag",
        roles: &[T, E],
    },
    Variant {
        name: "tagged-entities",
        description: "token, feature and entity tag",
        roles: &[T, F, E],
    },
    Variant {
        name: "nested-entities",
        description: "token and two entity tag layers",
        roles: &[T, E, E],
    },
    Variant {
        name: "relations",
        description: "token, entity tag and relations",
        roles: &[T, E, R],
    },
    Variant {
        name: "events",
        description: "token, entity tag and events",
        roles: &[T, E, V],
    },
    Variant {
        name: "conll",
        description: "token, POS tag, chunk tag and entity tag (CoNLL-2003 style)",
        roles: &[T, F, F, E],
    },
    Variant {
        name: "tagged-relations",
        description: "token, feature, entity tag and relations",
        roles: &[T, F, E, R],
    },
    Variant {
        name: "tagged-events",
        description: "token, feature, entity tag and events",
        roles: &[T, F, E, V],
    },
    Variant {
        name: "full",
        description: "token, entity tag, relations and events",
        roles: &[T, E, R, V],
    },
    Variant {
        name: "tagged-full",
        description: "token, feature, entity tag, relations and events",
        roles: &[T, F, E, R, V],
    },
];

/// All registered variants, in order of increasing arity.
pub fn variants() -> &'static [Variant] {
    VARIANTS
}

/// Finds a variant by name.
pub fn lookup(name: &str) -> Option<&'static Variant> {
    VARIANTS.iter().find(|v| v.name == name)
}

/// Finds the variant with exactly the roles of `colspec`.
pub fn name_of(colspec: &ColumnSpecification) -> Option<&'static str> {
    VARIANTS
        .iter()
        .find(|v| v.roles == colspec.roles())
        .map(|v| v.name)
}

/// The smallest feature-less variant that can hold entities plus,
/// as requested, relations and events.
pub fn covering(relations: bool, events: bool) -> &'static Variant {
    let name = match (relations, events) {
        (false, false) => "entities",
        (true, false) => "relations",
        (false, true) => "events",
        (true, true) => "full",
    };
    lookup(name).unwrap_or(&VARIANTS[1])
}

/// Resolves a configured colspec: a variant name or a header line.
pub fn resolve(spec: &str) -> Result<ColumnSpecification, ConfigurationError> {
    if let Some(variant) = lookup(spec.trim()) {
        return Ok(variant.colspec());
    }
    spec.parse::<ColumnSpecification>()
        .map_err(|err| ConfigurationError::UnknownColspec {
            name: spec.to_string(),
            reason: format!(
                "not a registered variant ({}) nor a valid header: {}",
                VARIANTS
                    .iter()
                    .map(|v| v.name)
                    .collect::<Vec<_>>()
                    .join(", "),
                err.message
            ),
        })
}
