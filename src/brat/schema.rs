//! Generation of a brat `annotation.conf` from observed annotations.
//!
//! A schema is accumulated with [`AnnotationSchema::observe`] per document,
//! combined with [`AnnotationSchema::merge`] across documents, and rendered
//! with `Display`:
//!
//! ```text
//! [entities]
//!
//! ORG
//! PER
//!
//! [relations]
//!
//! Works_for	Arg1:PER, Arg2:ORG
//!
//! [events]
//!
//! Hire	Agent:ORG, Theme?:PER
//!
//! [attributes]
//!
//! Negation	Arg:<EVENT>
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{AnnotationIndex, AnnotationRef, Argument, SupplementKind};

const ANY: &str = "<ANY>";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Slot {
    targets: BTreeSet<String>,
    /// Annotations with at least one argument in this slot.
    occurrences: usize,
    repeated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ArgumentTypes {
    instances: usize,
    /// Roles in order of first appearance.
    slots: Vec<(String, Slot)>,
}

impl ArgumentTypes {
    fn slot(&mut self, role: &str) -> &mut Slot {
        let index = match self.slots.iter().position(|(r, _)| r == role) {
            Some(index) => index,
            None => {
                self.slots.push((role.to_string(), Slot::default()));
                self.slots.len() - 1
            }
        };
        &mut self.slots[index].1
    }

    /// Records one annotation; `roles[i]` is the slot of `args[i]`.
    fn observe(&mut self, args: &[Argument], roles: &[&str], index: &AnnotationIndex) {
        self.instances += 1;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (arg, &role) in args.iter().zip(roles) {
            *counts.entry(role).or_default() += 1;
            self.slot(role).targets.insert(target_type(&arg.target, index));
        }
        for (role, count) in counts {
            let slot = self.slot(role);
            slot.occurrences += 1;
            slot.repeated |= count > 1;
        }
    }

    fn merge(&mut self, other: ArgumentTypes) {
        self.instances += other.instances;
        for (role, theirs) in other.slots {
            let ours = self.slot(&role);
            ours.targets.extend(theirs.targets);
            ours.occurrences += theirs.occurrences;
            ours.repeated |= theirs.repeated;
        }
    }

    fn render(&self) -> String {
        self.slots
            .iter()
            .map(|(role, slot)| {
                let optional = slot.occurrences < self.instances;
                let marker = match (optional, slot.repeated) {
                    (true, true) => "*",
                    (false, true) => "+",
                    (true, false) => "?",
                    (false, false) => "",
                };
                let targets = slot.targets.iter().cloned().collect::<Vec<_>>().join("|");
                format!("{}{}:{}", role, marker, targets)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct AttributeType {
    targets: BTreeSet<&'static str>,
    values: BTreeSet<String>,
}

/// Entity, relation, event and attribute types seen in one or more documents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationSchema {
    entities: BTreeSet<String>,
    relations: BTreeMap<String, ArgumentTypes>,
    events: BTreeMap<String, ArgumentTypes>,
    attributes: BTreeMap<String, AttributeType>,
}

fn base_role(role: &str) -> &str {
    let trimmed = role.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() {
        role
    } else {
        trimmed
    }
}

/// Slots of event arguments: `Theme2` fills the `Theme` slot when the
/// event has another argument with that base role. Other roles stay as
/// written.
fn event_slots(args: &[Argument]) -> Vec<&str> {
    args.iter()
        .map(|arg| {
            let base = base_role(&arg.role);
            let shared = args.iter().filter(|other| base_role(&other.role) == base).count();
            if shared > 1 {
                base
            } else {
                arg.role.as_str()
            }
        })
        .collect()
}

fn target_type(target: &AnnotationRef, index: &AnnotationIndex) -> String {
    let label = match target {
        AnnotationRef::Entity(id) => index.entity(*id).map(|e| e.label.as_str()),
        AnnotationRef::Relation(id) => index.relations.get(id).map(|r| r.label.as_str()),
        AnnotationRef::Event(id) => index.events.get(id).map(|e| e.label.as_str()),
        AnnotationRef::Other(_) => None,
    };
    label.unwrap_or(ANY).to_string()
}

impl AnnotationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.relations.is_empty()
            && self.events.is_empty()
            && self.attributes.is_empty()
    }

    /// Adds the types used by `index`.
    ///
    /// Entities that only serve as event triggers are not listed under
    /// `[entities]`, since brat declares trigger types with their events.
    pub fn observe(&mut self, index: &AnnotationIndex) {
        let triggers = index.trigger_ids();
        for entity in index.entities.values() {
            if !triggers.contains(&entity.id) {
                self.entities.insert(entity.label.clone());
            }
        }
        for relation in index.relations.values() {
            let roles = relation.args.each_ref().map(|arg| arg.role.as_str());
            self.relations
                .entry(relation.label.clone())
                .or_default()
                .observe(&relation.args, &roles, index);
        }
        for event in index.events.values() {
            self.events
                .entry(event.label.clone())
                .or_default()
                .observe(&event.args, &event_slots(&event.args), index);
        }
        for supplement in &index.supplements {
            if supplement.kind != SupplementKind::Attribute {
                continue;
            }
            let mut parts = supplement.body.split_whitespace();
            let (Some(name), Some(target)) = (parts.next(), parts.next()) else {
                continue;
            };
            let attribute = self.attributes.entry(name.to_string()).or_default();
            attribute.targets.insert(match target.parse::<AnnotationRef>() {
                Ok(AnnotationRef::Event(_)) => "<EVENT>",
                Ok(AnnotationRef::Relation(_)) => "<RELATION>",
                _ => "<ENTITY>",
            });
            if let Some(value) = parts.next() {
                attribute.values.insert(value.to_string());
            }
        }
    }

    /// Combines the types of two schemas.
    pub fn merge(&mut self, other: AnnotationSchema) {
        self.entities.extend(other.entities);
        for (label, types) in other.relations {
            self.relations.entry(label).or_default().merge(types);
        }
        for (label, types) in other.events {
            self.events.entry(label).or_default().merge(types);
        }
        for (name, theirs) in other.attributes {
            let ours = self.attributes.entry(name).or_default();
            ours.targets.extend(theirs.targets);
            ours.values.extend(theirs.values);
        }
    }
}

impl fmt::Display for AnnotationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[entities]\n")?;
        for label in &self.entities {
            writeln!(f, "{}", label)?;
        }

        writeln!(f, "\n[relations]\n")?;
        for (label, types) in &self.relations {
            writeln!(f, "{}\t{}", label, types.render())?;
        }

        writeln!(f, "\n[events]\n")?;
        for (label, types) in &self.events {
            if types.slots.is_empty() {
                writeln!(f, "{}", label)?;
            } else {
                writeln!(f, "{}\t{}", label, types.render())?;
            }
        }

        writeln!(f, "\n[attributes]\n")?;
        for (name, attribute) in &self.attributes {
            let targets = attribute.targets.iter().copied().collect::<Vec<_>>().join("|");
            write!(f, "{}\tArg:{}", name, targets)?;
            if !attribute.values.is_empty() {
                let values = attribute.values.iter().cloned().collect::<Vec<_>>().join("|");
                write!(f, ", Value:{}", values)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brat;
    use crate::config::Policy;

    fn index(ann: &str) -> AnnotationIndex {
        brat::parse(ann, Policy::Strict).unwrap().annotations
    }

    #[test]
    fn test_schema_sections() {
        let mut schema = AnnotationSchema::new();
        schema.observe(&index(
            "T1\tPER 0 4\tJohn\n\
             T2\tORG 5 8\tACM\n\
             T3\tHire 9 14\thired\n\
             T4\tHire 15 20\thired\n\
             R1\tWorks_for Arg1:T1 Arg2:T2\n\
             E1\tHire:T3 Agent:T2 Theme:T1\n\
             E2\tHire:T4 Agent:T2\n\
             A1\tNegation E2\n\
             A2\tCertainty T1 High\n",
        ));
        let conf = schema.to_string();
        assert!(conf.starts_with("[entities]\n\nORG\nPER\n\n[relations]\n"));
        assert!(conf.contains("Works_for\tArg1:PER, Arg2:ORG\n"));
        assert!(conf.contains("Hire\tAgent:ORG, Theme?:PER\n"));
        assert!(conf.contains("Negation\tArg:<EVENT>\n"));
        assert!(conf.contains("Certainty\tArg:<ENTITY>, Value:High\n"));
        assert!(!conf.contains("\nHire\n"));
    }

    #[test]
    fn test_repeated_roles_and_merge() {
        let mut first = AnnotationSchema::new();
        first.observe(&index(
            "T1\tProtein 0 3\tp53\nT2\tProtein 4 7\tMDM\nT3\tBinding 8 13\tbinds\n\
             E1\tBinding:T3 Theme:T1 Theme2:T2\n",
        ));
        let mut second = AnnotationSchema::new();
        second.observe(&index(
            "T1\tComplex 0 3\tAP1\nT2\tBinding 4 9\tbinds\nE1\tBinding:T2 Theme:T1\n",
        ));
        first.merge(second);
        let conf = first.to_string();
        assert!(conf.contains("Binding\tTheme+:Complex|Protein\n"), "{conf}");
        assert!(conf.contains("\nComplex\nProtein\n"));
    }

    #[test]
    fn test_numbered_roles_fold_only_when_repeated() {
        let mut schema = AnnotationSchema::new();
        schema.observe(&index(
            "T1\tPER 0 4\tJohn\nT2\tLOC 5 10\tParis\nT3\tMove 11 16\tmoved\n\
             R1\tNear Arg1:T1 Arg2:T2\n\
             R2\tSame Arg1:T2 Arg2:T2\n\
             E1\tMove:T3 Theme:T1 Site2:T2\n",
        ));
        let conf = schema.to_string();
        assert!(conf.contains("Near\tArg1:PER, Arg2:LOC\n"), "{conf}");
        assert!(conf.contains("Same\tArg1:LOC, Arg2:LOC\n"), "{conf}");
        assert!(conf.contains("Move\tTheme:PER, Site2:LOC\n"), "{conf}");
        assert!(!conf.contains("Arg+"));
    }

    #[test]
    fn test_empty_schema() {
        let schema = AnnotationSchema::new();
        assert!(schema.is_empty());
        assert_eq!(
            schema.to_string(),
            "[entities]\n\n\n[relations]\n\n\n[events]\n\n\n[attributes]\n\n"
        );
    }
}
