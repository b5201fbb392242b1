//! Newtype IDs for brat annotations.
//!
//! brat identifiers are a one-letter kind prefix plus a number (`T1`,
//! `R7`, `E3`). Keeping the kinds apart as types prevents passing a relation
//! where an entity is expected; [`AnnotationRef`] is used where brat allows
//! either.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a text-bound annotation (`T<n>`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Creates a new EntityId.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying number.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Identifier of a binary relation (`R<n>`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u32);

impl RelationId {
    /// Creates a new RelationId.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying number.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationId({})", self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Identifier of an event (`E<n>`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl EventId {
    /// Creates a new EventId.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying number.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId::new(id)
    }
}

impl From<u32> for RelationId {
    fn from(id: u32) -> Self {
        RelationId::new(id)
    }
}

impl From<u32> for EventId {
    fn from(id: u32) -> Self {
        EventId::new(id)
    }
}

/// A reference to any annotation, as found in brat argument slots.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnnotationRef {
    Entity(EntityId),
    Relation(RelationId),
    Event(EventId),
    /// Anything else (attributes, notes, malformed ids).
    Other(String),
}

impl AnnotationRef {
    /// The entity this reference names, if it names one.
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            AnnotationRef::Entity(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<EntityId> for AnnotationRef {
    fn from(id: EntityId) -> Self {
        AnnotationRef::Entity(id)
    }
}

impl fmt::Display for AnnotationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationRef::Entity(id) => id.fmt(f),
            AnnotationRef::Relation(id) => id.fmt(f),
            AnnotationRef::Event(id) => id.fmt(f),
            AnnotationRef::Other(raw) => f.write_str(raw),
        }
    }
}

impl FromStr for AnnotationRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = |rest: &str| rest.parse::<u32>().ok();
        let parsed = match s.split_at_checked(1) {
            Some(("T", rest)) => number(rest).map(|n| AnnotationRef::Entity(EntityId(n))),
            Some(("R", rest)) => number(rest).map(|n| AnnotationRef::Relation(RelationId(n))),
            Some(("E", rest)) => number(rest).map(|n| AnnotationRef::Event(EventId(n))),
            _ => None,
        };
        Ok(parsed.unwrap_or_else(|| AnnotationRef::Other(s.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_brat_prefix() {
        assert_eq!(EntityId(3).to_string(), "T3");
        assert_eq!(RelationId(1).to_string(), "R1");
        assert_eq!(EventId(12).to_string(), "E12");
    }

    #[test]
    fn test_id_ordering() {
        assert!(EntityId(2) < EntityId(10));
        assert!(EventId(1) < EventId(2));
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            "T12".parse::<AnnotationRef>().unwrap(),
            AnnotationRef::Entity(EntityId(12))
        );
        assert_eq!(
            "E2".parse::<AnnotationRef>().unwrap(),
            AnnotationRef::Event(EventId(2))
        );
        assert_eq!(
            "A1".parse::<AnnotationRef>().unwrap(),
            AnnotationRef::Other("A1".to_string())
        );
        assert_eq!(
            "Tx".parse::<AnnotationRef>().unwrap(),
            AnnotationRef::Other("Tx".to_string())
        );
        assert_eq!(
            "ü".parse::<AnnotationRef>().unwrap(),
            AnnotationRef::Other("ü".to_string())
        );
    }
}
