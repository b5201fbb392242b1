//! The shared document model both formats are read into and written from.
//!
//! A [`Document`] owns its text, its sentences (which own their tokens),
//! and an [`AnnotationIndex`] holding entities, relations and events keyed
//! by their brat identifiers. Cross-references are identifiers, never
//! direct links, so annotations form a graph without ownership cycles.
//!
//! All offsets are char offsets into [`Document::text`].

mod annotation;
mod document;
mod ids;

pub use annotation::{
    AnnotationIndex, Argument, Entity, Event, Fragment, Relation, Supplement, SupplementKind,
};
pub use document::{Document, Sentence, SourceText, Token};
pub use ids::{AnnotationRef, EntityId, EventId, RelationId};
