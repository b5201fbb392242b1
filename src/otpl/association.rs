//! Cell grammar of RELATION_TAG and EVENT_TAG columns.
//!
//! A cell is the empty marker or one or more items separated by `|`.
//! Numbers are sentence-local entity indices, counting from 0 in order of
//! (start offset, entity column):
//!
//! ```text
//! Works_for:0:2                  relation, roles Arg1 and Arg2
//! Located:Part=1:Whole=3         relation with explicit roles
//! Hire:4:Agent=0:Theme=2         event with trigger 4 and two arguments
//! Arrest:5                       event without arguments
//! ```
//!
//! A relation has exactly two arguments, both bare or both named. An event
//! has a bare trigger followed by any number of named arguments, so the two
//! item kinds never look alike.
//!
//! Rendering is canonical: a relation whose roles are `Arg1` and `Arg2`, in
//! that order, is always written in the bare form, so
//! `Works_for:Arg1=0:Arg2=2` comes back as `Works_for:0:2`. brat standoff
//! does not distinguish the two spellings either.
//!
//! An item is written on the row of its anchor: the first argument of a
//! relation, the trigger of an event.

use std::fmt;

/// Default roles of a relation written without explicit roles.
pub const DEFAULT_RELATION_ROLES: [&str; 2] = ["Arg1", "Arg2"];

const ITEM_SEPARATOR: char = '|';
const FIELD_SEPARATOR: char = ':';
const ROLE_SEPARATOR: char = '=';

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationItem {
    pub label: String,
    pub args: [(String, usize); 2],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventItem {
    pub label: String,
    pub trigger: usize,
    pub args: Vec<(String, usize)>,
}

/// One relation or event in an association cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Relation(RelationItem),
    Event(EventItem),
}

impl Item {
    pub fn label(&self) -> &str {
        match self {
            Item::Relation(r) => &r.label,
            Item::Event(e) => &e.label,
        }
    }

    /// The entity index whose row the item is written on.
    pub fn anchor(&self) -> usize {
        match self {
            Item::Relation(r) => r.args[0].1,
            Item::Event(e) => e.trigger,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut fields = raw.split(FIELD_SEPARATOR);
        let label = fields.next().unwrap_or_default();
        check_name(label, raw)?;

        let parsed = fields.map(|f| field(f, raw)).collect::<Result<Vec<_>, _>>()?;
        match parsed.as_slice() {
            [(None, a), (None, b)] => Ok(Item::Relation(RelationItem {
                label: label.to_string(),
                args: [
                    (DEFAULT_RELATION_ROLES[0].to_string(), *a),
                    (DEFAULT_RELATION_ROLES[1].to_string(), *b),
                ],
            })),
            [(Some(r1), a), (Some(r2), b)] => Ok(Item::Relation(RelationItem {
                label: label.to_string(),
                args: [(r1.to_string(), *a), (r2.to_string(), *b)],
            })),
            [(None, trigger), rest @ ..] => {
                let args = rest
                    .iter()
                    .map(|(role, index)| match role {
                        Some(role) => Ok((role.to_string(), *index)),
                        None => Err(format!("'{}': event arguments need a role", raw)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Item::Event(EventItem {
                    label: label.to_string(),
                    trigger: *trigger,
                    args,
                }))
            }
            [] => Err(format!("'{}' has no entity index", raw)),
            _ => Err(format!("'{}' is neither a relation nor an event", raw)),
        }
    }
}

fn check_name(name: &str, raw: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("'{}' has an empty label or role", raw));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == ITEM_SEPARATOR || c == ROLE_SEPARATOR)
    {
        return Err(format!("'{}' has an invalid label or role '{}'", raw, name));
    }
    Ok(())
}

fn field<'a>(field: &'a str, raw: &str) -> Result<(Option<&'a str>, usize), String> {
    let (role, index) = match field.split_once(ROLE_SEPARATOR) {
        Some((role, index)) => {
            check_name(role, raw)?;
            (Some(role), index)
        }
        None => (None, field),
    };
    let index = index
        .parse::<usize>()
        .map_err(|_| format!("'{}': '{}' is not an entity index", raw, index))?;
    Ok((role, index))
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Relation(r) => {
                let [(r1, a), (r2, b)] = &r.args;
                if [r1.as_str(), r2.as_str()] == DEFAULT_RELATION_ROLES {
                    write!(f, "{}:{}:{}", r.label, a, b)
                } else {
                    write!(f, "{}:{}={}:{}={}", r.label, r1, a, r2, b)
                }
            }
            Item::Event(e) => {
                write!(f, "{}:{}", e.label, e.trigger)?;
                for (role, index) in &e.args {
                    write!(f, ":{}={}", role, index)?;
                }
                Ok(())
            }
        }
    }
}

/// Parses a cell; the empty marker yields no items.
pub fn parse_cell(cell: &str, empty_marker: &str) -> Result<Vec<Item>, String> {
    if cell == empty_marker {
        return Ok(Vec::new());
    }
    cell.split(ITEM_SEPARATOR).map(Item::parse).collect()
}

/// Renders items as a cell; no items yields the empty marker.
pub fn render_cell(items: &[Item], empty_marker: &str) -> String {
    if items.is_empty() {
        return empty_marker.to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&ITEM_SEPARATOR.to_string())
}

/// True if `name` can be written as an item label or role.
pub fn is_writable_name(name: &str) -> bool {
    check_name(name, name).is_ok() && !name.contains(FIELD_SEPARATOR)
}

/// Fuzz-only entrypoint: a parsed cell renders to text that parses back to
/// the same items.
#[cfg(feature = "fuzzing")]
pub fn fuzz_cell_round_trip(input: &str, empty_marker: &str) -> Result<(), String> {
    let items = parse_cell(input, empty_marker)?;
    let rendered = render_cell(&items, empty_marker);
    assert_eq!(parse_cell(&rendered, empty_marker), Ok(items), "{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(label: &str, r1: &str, a: usize, r2: &str, b: usize) -> Item {
        Item::Relation(RelationItem {
            label: label.to_string(),
            args: [(r1.to_string(), a), (r2.to_string(), b)],
        })
    }

    #[test]
    fn test_parse_relations() {
        assert_eq!(
            Item::parse("Works_for:0:2").unwrap(),
            relation("Works_for", "Arg1", 0, "Arg2", 2)
        );
        assert_eq!(
            Item::parse("Located:Part=1:Whole=3").unwrap(),
            relation("Located", "Part", 1, "Whole", 3)
        );
    }

    #[test]
    fn test_parse_events() {
        let item = Item::parse("Hire:4:Agent=0:Theme=2").unwrap();
        assert_eq!(
            item,
            Item::Event(EventItem {
                label: "Hire".to_string(),
                trigger: 4,
                args: vec![("Agent".to_string(), 0), ("Theme".to_string(), 2)],
            })
        );
        assert_eq!(item.anchor(), 4);

        let bare = Item::parse("Arrest:5").unwrap();
        assert!(matches!(bare, Item::Event(ref e) if e.args.is_empty() && e.trigger == 5));

        assert!(matches!(
            Item::parse("Hire:4:Agent=0").unwrap(),
            Item::Event(_)
        ));
    }

    #[test]
    fn test_parse_errors() {
        for raw in [
            "Works_for",
            ":0:1",
            "R:x:1",
            "R:A=0:1",
            "E:1:2:3",
            "E:1:Agent=0:2",
            "R:=0:B=1",
            "R:-1:0",
            "John",
        ] {
            assert!(Item::parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_render_round_trip() {
        for raw in [
            "Works_for:0:2",
            "Located:Part=1:Whole=3",
            "Hire:4:Agent=0:Theme=2",
            "Arrest:5",
        ] {
            assert_eq!(Item::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_default_roles_render_bare() {
        let item = Item::parse("Works_for:Arg1=0:Arg2=2").unwrap();
        assert_eq!(item, Item::parse("Works_for:0:2").unwrap());
        assert_eq!(item.to_string(), "Works_for:0:2");
        assert_eq!(item.anchor(), 0);

        let swapped = Item::parse("Works_for:Arg2=0:Arg1=2").unwrap();
        assert_eq!(swapped.to_string(), "Works_for:Arg2=0:Arg1=2");
    }

    #[test]
    fn test_cells() {
        assert!(parse_cell("NULL", "NULL").unwrap().is_empty());
        let items = parse_cell("A:0:1|Hire:1:Theme=0", "NULL").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(render_cell(&items, "NULL"), "A:0:1|Hire:1:Theme=0");
        assert_eq!(render_cell(&[], "-"), "-");
        assert!(parse_cell("A:0:1|", "NULL").is_err());
    }

    #[test]
    fn test_writable_names() {
        assert!(is_writable_name("Works_for"));
        assert!(is_writable_name("Theme2"));
        assert!(!is_writable_name("a:b"));
        assert!(!is_writable_name("a b"));
        assert!(!is_writable_name(""));
    }
}
