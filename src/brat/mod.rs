//! brat standoff (`.ann`) parsing and serialization.
//!
//! ```text
//! T1	PER 0 10	John Smith
//! T2	Part 15 19;26 32	left kidney
//! R1	Works_for Arg1:T1 Arg2:T3
//! E1	Hire:T4 Agent:T3 Theme:T1
//! A1	Negation E1
//! #1	AnnotatorNotes T1	checked
//! ```
//!
//! Entities, relations and events are parsed into the
//! [`AnnotationIndex`]; attributes, normalizations, notes and
//! equivalences are kept verbatim as [`Supplement`]s. Offsets are char
//! offsets into the accompanying `.txt` file.

pub mod schema;

use std::collections::HashMap;

use crate::config::Policy;
use crate::error::{DataFormatError, ErrorKind};
use crate::model::{
    AnnotationIndex, AnnotationRef, Argument, Entity, Event, Fragment, Relation, Supplement,
    SupplementKind,
};
use crate::otpl::reader::split_lines;

pub use schema::AnnotationSchema;

/// Tracing target for standoff parsing.
pub const TRACING_TARGET_BRAT: &str = "otplc::brat";

/// The result of [`parse`].
#[derive(Clone, Debug, Default)]
pub struct Parsed {
    pub annotations: AnnotationIndex,
    /// Lines skipped in lenient mode.
    pub warnings: Vec<DataFormatError>,
}

enum Record {
    Entity(Entity),
    Relation(Relation),
    Event(Event),
    Supplement(Supplement),
}

/// True if `name` is a valid brat type or role name (`^[\w-]+$`).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Parses standoff text.
///
/// Unparseable lines and duplicate ids are [`ErrorKind::InvalidStandoff`];
/// in lenient mode they are skipped. A relation or event argument naming
/// an annotation that is not in the file is
/// [`ErrorKind::DanglingReference`]; in lenient mode the relation or
/// event is dropped.
pub fn parse(ann: &str, policy: Policy) -> Result<Parsed, DataFormatError> {
    let mut parsed = Parsed::default();
    // id -> one-based line
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (i, line) in split_lines(ann).into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let number = i + 1;

        let record = parse_line(line).and_then(|record| {
            let id = match &record {
                Record::Entity(e) => e.id.to_string(),
                Record::Relation(r) => r.id.to_string(),
                Record::Event(e) => e.id.to_string(),
                // equivalences share the id '*'
                Record::Supplement(s) if s.kind == SupplementKind::Equivalence => {
                    return Ok(record)
                }
                Record::Supplement(s) => s.id.clone(),
            };
            if seen.contains_key(&id) {
                Err(format!("duplicate id '{}'", id))
            } else {
                seen.insert(id, number);
                Ok(record)
            }
        });

        match record {
            Ok(Record::Entity(e)) => parsed.annotations.insert_entity(e),
            Ok(Record::Relation(r)) => parsed.annotations.insert_relation(r),
            Ok(Record::Event(e)) => parsed.annotations.insert_event(e),
            Ok(Record::Supplement(s)) => parsed.annotations.supplements.push(s),
            Err(message) => {
                let err = DataFormatError::new(ErrorKind::InvalidStandoff, message).at_line(number);
                policy.recover(err, &mut parsed.warnings)?;
            }
        }
    }

    drop_dangling(&mut parsed, &seen, policy)?;

    tracing::debug!(
        target: TRACING_TARGET_BRAT,
        entities = parsed.annotations.entities.len(),
        relations = parsed.annotations.relations.len(),
        events = parsed.annotations.events.len(),
        supplements = parsed.annotations.supplements.len(),
        "parsed standoff"
    );
    Ok(parsed)
}

/// Reports references to missing annotations and drops their owners.
///
/// Dropping an event can leave references to it dangling, so this repeats
/// until every reference resolves.
fn drop_dangling(
    parsed: &mut Parsed,
    lines: &HashMap<String, usize>,
    policy: Policy,
) -> Result<(), DataFormatError> {
    loop {
        let dangling = parsed.annotations.dangling_references();
        if dangling.is_empty() {
            return Ok(());
        }
        for (owner, target) in dangling {
            let mut err = DataFormatError::new(
                ErrorKind::DanglingReference,
                format!("{} refers to {}, which is not annotated", owner, target),
            );
            if let Some(line) = lines.get(&owner) {
                err = err.at_line(*line);
            }
            policy.recover(err, &mut parsed.warnings)?;

            let annotations = &mut parsed.annotations;
            match owner.parse::<AnnotationRef>() {
                Ok(AnnotationRef::Relation(id)) => {
                    annotations.relations.remove(&id);
                }
                Ok(AnnotationRef::Event(id)) => {
                    annotations.events.remove(&id);
                }
                _ => {}
            }
        }
    }
}

fn parse_line(line: &str) -> Result<Record, String> {
    let (id, rest) = line
        .split_once('\t')
        .ok_or_else(|| format!("'{}' has no tab after the id", line))?;

    if let Some(kind) = SupplementKind::of_id(id) {
        return Ok(Record::Supplement(Supplement {
            kind,
            id: id.to_string(),
            body: rest.to_string(),
        }));
    }

    match id.parse::<AnnotationRef>() {
        Ok(AnnotationRef::Entity(id)) => {
            let (head, text) = match rest.split_once('\t') {
                Some((head, text)) => (head, Some(text)),
                None => (rest, None),
            };
            let (label, offsets) = head
                .split_once(' ')
                .ok_or_else(|| format!("{}: missing offsets", id))?;
            let fragments = offsets
                .split(';')
                .map(|pair| fragment(pair).ok_or_else(|| format!("{}: bad offsets '{}'", id, pair)))
                .collect::<Result<Vec<_>, _>>()?;
            let mut entity = Entity::new(id, label, fragments);
            entity.text = text.map(str::to_string);
            Ok(Record::Entity(entity))
        }
        Ok(AnnotationRef::Relation(id)) => {
            let mut parts = rest.split_whitespace();
            let label = parts.next().ok_or_else(|| format!("{}: missing type", id))?;
            let args = parts.map(argument).collect::<Result<Vec<_>, _>>()?;
            let args: [Argument; 2] = args
                .try_into()
                .map_err(|_| format!("{}: a relation needs exactly two arguments", id))?;
            Ok(Record::Relation(Relation::new(id, label, args)))
        }
        Ok(AnnotationRef::Event(id)) => {
            let mut parts = rest.split_whitespace();
            let head = parts.next().ok_or_else(|| format!("{}: missing type", id))?;
            let (label, trigger) = head
                .split_once(':')
                .ok_or_else(|| format!("{}: missing trigger", id))?;
            let trigger = match trigger.parse::<AnnotationRef>() {
                Ok(AnnotationRef::Entity(trigger)) => trigger,
                _ => return Err(format!("{}: trigger '{}' is not an entity", id, trigger)),
            };
            let args = parts.map(argument).collect::<Result<Vec<_>, _>>()?;
            Ok(Record::Event(Event::new(id, label, trigger, args)))
        }
        _ => Err(format!("unknown annotation id '{}'", id)),
    }
}

fn fragment(pair: &str) -> Option<Fragment> {
    let (start, end) = pair.trim().split_once(' ')?;
    let start = start.parse().ok()?;
    let end = end.parse().ok()?;
    (start <= end).then(|| Fragment::new(start, end))
}

fn argument(raw: &str) -> Result<Argument, String> {
    let (role, target) = raw
        .split_once(':')
        .ok_or_else(|| format!("argument '{}' is not ROLE:ID", raw))?;
    if role.is_empty() || target.is_empty() {
        return Err(format!("argument '{}' is not ROLE:ID", raw));
    }
    let target = target
        .parse::<AnnotationRef>()
        .unwrap_or_else(|never| match never {});
    Ok(Argument::new(role, target))
}

/// Renders one entity record.
pub fn entity_line(entity: &Entity) -> String {
    let fragments = entity
        .fragments
        .iter()
        .map(|f| format!("{} {}", f.start, f.end))
        .collect::<Vec<_>>()
        .join(";");
    format!(
        "{}\t{} {}\t{}",
        entity.id,
        entity.label,
        fragments,
        entity.text.as_deref().unwrap_or_default()
    )
}

/// Serializes entities, relations, events and supplements, in that order.
pub fn serialize(annotations: &AnnotationIndex) -> String {
    let mut out = String::new();

    for entity in annotations.entities.values() {
        out.push_str(&entity_line(entity));
        out.push('\n');
    }
    for relation in annotations.relations.values() {
        let [a, b] = &relation.args;
        out.push_str(&format!("{}\t{} {} {}\n", relation.id, relation.label, a, b));
    }
    for event in annotations.events.values() {
        out.push_str(&format!("{}\t{}:{}", event.id, event.label, event.trigger));
        for arg in &event.args {
            out.push_str(&format!(" {}", arg));
        }
        out.push('\n');
    }
    for supplement in &annotations.supplements {
        out.push_str(&format!("{}\t{}\n", supplement.id, supplement.body));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, EventId, RelationId};

    const ANN: &str = "T1\tPER 0 10\tJohn Smith\n\
                       T2\tPart 15 19;26 32\tleft kidney\n\
                       T3\tHire 40 45\thired\n\
                       R1\tWorks_for Arg1:T1 Arg2:T2\n\
                       E1\tHire:T3 Agent:T1 Theme:T2\n\
                       A1\tNegation E1\n\
                       #1\tAnnotatorNotes T1\tchecked\n";

    #[test]
    fn test_parse_all_record_kinds() {
        let parsed = parse(ANN, Policy::Strict).unwrap();
        let index = parsed.annotations;
        assert!(parsed.warnings.is_empty());
        assert_eq!(index.entities.len(), 3);
        assert_eq!(
            index.entity(EntityId(2)).unwrap().fragments,
            vec![Fragment::new(15, 19), Fragment::new(26, 32)]
        );
        assert_eq!(
            index.entity(EntityId(1)).unwrap().text.as_deref(),
            Some("John Smith")
        );
        let relation = &index.relations[&RelationId(1)];
        assert_eq!(relation.args[1].target, AnnotationRef::Entity(EntityId(2)));
        let event = &index.events[&EventId(1)];
        assert_eq!(event.trigger, EntityId(3));
        assert_eq!(event.args.len(), 2);
        assert_eq!(index.supplements.len(), 2);
        assert_eq!(index.supplements[1].kind, SupplementKind::Note);
        assert!(index.dangling_references().is_empty());
    }

    #[test]
    fn test_serialize_reproduces_canonical_input() {
        let parsed = parse(ANN, Policy::Strict).unwrap();
        assert_eq!(serialize(&parsed.annotations), ANN);
    }

    #[test]
    fn test_crlf_and_trailing_tabs() {
        let parsed = parse("T1\tPER 0 4\tJohn\r\nR1\tRel Arg1:T1 Arg2:T1\t\r\n", Policy::Strict).unwrap();
        assert_eq!(parsed.annotations.relations.len(), 1);
    }

    #[test]
    fn test_invalid_lines_strict_and_lenient() {
        let ann = "T1\tPER 0 x\tJohn\nT2\tPER 5 10\tSmith\nR1\tRel Arg1:T2\nT2\tORG 0 1\tJ\n";
        let err = parse(ann, Policy::Strict).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidStandoff);
        assert_eq!(err.location.line, Some(1));

        let parsed = parse(ann, Policy::Lenient).unwrap();
        assert_eq!(parsed.warnings.len(), 3);
        assert_eq!(parsed.annotations.entities.len(), 1);
        assert_eq!(parsed.annotations.entity(EntityId(2)).unwrap().label, "PER");
    }

    #[test]
    fn test_dangling_references_strict_and_lenient() {
        let ann = "T1\tPER 0 4\tJohn\n\
                   T2\tHire 5 10\thired\n\
                   R1\tKnows Arg1:T1 Arg2:T1\n\
                   E1\tHire:T2 Agent:T1 Theme:T9\n\
                   R2\tCause Arg1:E1 Arg2:T1\n";
        let err = parse(ann, Policy::Strict).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DanglingReference);
        assert_eq!(err.location.line, Some(4));
        assert!(err.message.contains("T9"));

        let parsed = parse(ann, Policy::Lenient).unwrap();
        assert_eq!(parsed.warnings.len(), 2);
        assert_eq!(parsed.warnings[1].location.line, Some(5));
        let index = parsed.annotations;
        assert!(index.events.is_empty());
        assert_eq!(index.relations.keys().copied().collect::<Vec<_>>(), vec![RelationId(1)]);
        assert!(index.dangling_references().is_empty());
    }

    #[test]
    fn test_rejects_bad_records() {
        for line in [
            "T1 PER 0 4 John",
            "T1\tPER\tJohn",
            "T1\tPER 4 0\tJohn",
            "E1\tHire T3",
            "E1\tHire:R1",
            "R1\tRel Arg1:T1 Arg2:T2 Arg3:T3",
            "X1\tFoo",
        ] {
            assert!(parse(line, Policy::Strict).is_err(), "{line}");
        }
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("Works_for"));
        assert!(is_valid_name("Protein-Complex"));
        assert!(is_valid_name("Ärzte"));
        assert!(!is_valid_name("two words"));
        assert!(!is_valid_name("a:b"));
        assert!(!is_valid_name(""));
    }
}
