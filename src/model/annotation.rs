//! Standoff annotations and the per-document annotation index.
//!
//! Relations and events never embed the entities they connect; they hold
//! [`AnnotationRef`]s that are resolved through the [`AnnotationIndex`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::document::SourceText;
use super::ids::{AnnotationRef, EntityId, EventId, RelationId};

/// One contiguous character range `[start, end)` of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fragment {
    pub start: usize,
    pub end: usize,
}

impl Fragment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A text-bound annotation (brat `T` record).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub label: String,
    /// Character ranges in order of appearance; never empty.
    pub fragments: Vec<Fragment>,
    /// The covered text as stated in the standoff record, if any.
    pub text: Option<String>,
}

impl Entity {
    /// Creates an entity without a stated covered text.
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>, fragments: Vec<Fragment>) -> Self {
        assert!(!fragments.is_empty(), "an entity needs at least one fragment");
        Self {
            id: id.into(),
            label: label.into(),
            fragments,
            text: None,
        }
    }

    /// Sets the stated covered text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Start offset of the first fragment.
    pub fn start(&self) -> usize {
        self.fragments.iter().map(|f| f.start).min().unwrap_or(0)
    }

    /// End offset of the last fragment.
    pub fn end(&self) -> usize {
        self.fragments.iter().map(|f| f.end).max().unwrap_or(0)
    }

    /// The fragment texts of `source`, joined by a single space.
    ///
    /// Returns `None` if a fragment lies outside the text.
    pub fn covered_text(&self, source: &SourceText) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fragments.len());
        for fragment in &self.fragments {
            parts.push(source.slice(fragment.start..fragment.end)?);
        }
        Some(parts.join(" "))
    }
}

/// A role-labeled reference from a relation or event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    pub role: String,
    pub target: AnnotationRef,
}

impl Argument {
    pub fn new(role: impl Into<String>, target: impl Into<AnnotationRef>) -> Self {
        Self {
            role: role.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.target)
    }
}

/// A binary relation (brat `R` record).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub label: String,
    pub args: [Argument; 2],
}

impl Relation {
    pub fn new(id: impl Into<RelationId>, label: impl Into<String>, args: [Argument; 2]) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            args,
        }
    }
}

/// An event (brat `E` record): a trigger entity plus role-labeled arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub label: String,
    pub trigger: EntityId,
    pub args: Vec<Argument>,
}

impl Event {
    pub fn new(
        id: impl Into<EventId>,
        label: impl Into<String>,
        trigger: impl Into<EntityId>,
        args: Vec<Argument>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            trigger: trigger.into(),
            args,
        }
    }
}

/// brat record kinds that have no OTPL column representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplementKind {
    /// `A` and `M` records.
    Attribute,
    /// `N` records.
    Normalization,
    /// `#` records.
    Note,
    /// `*` records.
    Equivalence,
}

impl SupplementKind {
    /// Classifies a brat id by its first character.
    pub fn of_id(id: &str) -> Option<Self> {
        match id.chars().next()? {
            'A' | 'M' => Some(SupplementKind::Attribute),
            'N' => Some(SupplementKind::Normalization),
            '#' => Some(SupplementKind::Note),
            '*' => Some(SupplementKind::Equivalence),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SupplementKind::Attribute => "attribute",
            SupplementKind::Normalization => "normalization",
            SupplementKind::Note => "note",
            SupplementKind::Equivalence => "equivalence",
        }
    }
}

/// A brat record kept verbatim: the id and everything after the first tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Supplement {
    pub kind: SupplementKind,
    pub id: String,
    pub body: String,
}

/// Identifier-keyed storage for all annotations of a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationIndex {
    pub entities: BTreeMap<EntityId, Entity>,
    pub relations: BTreeMap<RelationId, Relation>,
    pub events: BTreeMap<EventId, Event>,
    pub supplements: Vec<Supplement>,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.relations.is_empty()
            && self.events.is_empty()
            && self.supplements.is_empty()
    }

    /// Total number of records of every kind.
    pub fn len(&self) -> usize {
        self.entities.len() + self.relations.len() + self.events.len() + self.supplements.len()
    }

    pub fn insert_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub fn insert_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.id, relation);
    }

    pub fn insert_event(&mut self, event: Event) {
        self.events.insert(event.id, event);
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// True if `target` names an annotation stored in this index.
    pub fn resolves(&self, target: &AnnotationRef) -> bool {
        match target {
            AnnotationRef::Entity(id) => self.entities.contains_key(id),
            AnnotationRef::Relation(id) => self.relations.contains_key(id),
            AnnotationRef::Event(id) => self.events.contains_key(id),
            AnnotationRef::Other(_) => false,
        }
    }

    /// Every reference that does not resolve, with the id of its owner.
    pub fn dangling_references(&self) -> Vec<(String, AnnotationRef)> {
        let mut dangling = Vec::new();
        for relation in self.relations.values() {
            for arg in &relation.args {
                if !self.resolves(&arg.target) {
                    dangling.push((relation.id.to_string(), arg.target.clone()));
                }
            }
        }
        for event in self.events.values() {
            if !self.entities.contains_key(&event.trigger) {
                dangling.push((event.id.to_string(), AnnotationRef::Entity(event.trigger)));
            }
            for arg in &event.args {
                if !self.resolves(&arg.target) {
                    dangling.push((event.id.to_string(), arg.target.clone()));
                }
            }
        }
        dangling
    }

    /// Entities that are event triggers.
    pub fn trigger_ids(&self) -> BTreeSet<EntityId> {
        self.events.values().map(|e| e.trigger).collect()
    }

    pub fn next_entity_id(&self) -> EntityId {
        EntityId(self.entities.keys().next_back().map_or(1, |id| id.0 + 1))
    }

    pub fn next_relation_id(&self) -> RelationId {
        RelationId(self.relations.keys().next_back().map_or(1, |id| id.0 + 1))
    }

    pub fn next_event_id(&self) -> EventId {
        EventId(self.events.keys().next_back().map_or(1, |id| id.0 + 1))
    }
}
