#![allow(dead_code)]

use std::ops::Range;

use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const ENTITY_LABELS: [&str; 3] = ["PER", "ORG", "LOC"];
pub const RELATION_LABELS: [&str; 2] = ["Works_for", "Part_of"];
pub const EVENT_LABELS: [&str; 2] = ["Hire", "Move"];
pub const EVENT_ROLES: [&str; 2] = ["Theme", "Cause"];

/// Two nesting levels of entities plus one relation and one event column.
pub const COLSPEC: &str = "TEXT ENTITY_TAG ENTITY_TAG RELATION_TAG EVENT_TAG";
pub const RELATION_COLUMN: usize = 3;

pub const SCHEMES: [&str; 4] = ["io", "bio", "bilou", "bioes"];

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// An entity over token ranges of its sentence, in one ENTITY_TAG column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySem {
    pub label: String,
    /// 0 for top-level entities, 1 for entities nested inside them.
    pub column: usize,
    /// Sorted and separated by at least one token.
    pub fragments: Vec<Range<usize>>,
}

impl EntitySem {
    pub fn first_token(&self) -> usize {
        self.fragments[0].start
    }
}

/// A relation between two entities of one sentence, by sentence-local number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationSem {
    pub label: String,
    pub first: usize,
    pub second: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSem {
    pub label: String,
    pub trigger: usize,
    pub args: Vec<(String, usize)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentenceSem {
    pub words: Vec<String>,
    /// Sorted by (first token, column).
    pub entities: Vec<EntitySem>,
    /// Sorted by the first token of the first argument.
    pub relations: Vec<RelationSem>,
    /// Sorted by the first token of the trigger.
    pub events: Vec<EventSem>,
}

/// A tokenized document whose annotations both formats express exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleDoc {
    pub sentences: Vec<SentenceSem>,
}

/// An association item written away from its anchor row.
#[derive(Clone, Copy, Debug)]
enum Moved {
    Relation { sentence: usize, index: usize, row: usize },
    Event { sentence: usize, index: usize, row: usize },
}

/// label, first fragment length, optional (gap, second fragment length),
/// optional nested sub-range of the first fragment.
type Plan = (usize, usize, Option<(usize, usize)>, Option<(Index, Index)>);
type EventParts = (Index, usize, Vec<(Index, usize)>);
type SentenceParts = (
    Vec<String>,
    Vec<Option<Plan>>,
    Vec<(Index, Index, usize)>,
    Vec<EventParts>,
);

fn arb_plan() -> impl Strategy<Value = Plan> {
    (
        0..ENTITY_LABELS.len(),
        1..4usize,
        prop::option::weighted(0.3, (1..3usize, 1..3usize)),
        prop::option::weighted(0.3, (any::<Index>(), any::<Index>())),
    )
}

fn arb_sentence(max_tokens: usize, min_gap: usize) -> impl Strategy<Value = SentenceSem> {
    (1..=max_tokens)
        .prop_flat_map(|n| {
            (
                prop::collection::vec("[a-z]{1,6}", n),
                prop::collection::vec(prop::option::weighted(0.4, arb_plan()), n),
                prop::collection::vec(
                    (any::<Index>(), any::<Index>(), 0..RELATION_LABELS.len()),
                    0..3,
                ),
                prop::collection::vec(
                    (
                        any::<Index>(),
                        0..EVENT_LABELS.len(),
                        prop::collection::vec((any::<Index>(), 0..EVENT_ROLES.len()), 0..3),
                    ),
                    0..2,
                ),
            )
        })
        .prop_map(move |parts: SentenceParts| assemble(parts, min_gap))
}

/// The free tokens from `start`, at most `len` of them, up to the first
/// blocked one.
fn free_run(blocked: &[bool], start: usize, len: usize) -> Option<Range<usize>> {
    if start >= blocked.len() || blocked[start] {
        return None;
    }
    let mut end = start;
    while end < blocked.len() && end < start + len && !blocked[end] {
        end += 1;
    }
    Some(start..end)
}

fn block(blocked: &mut [bool], range: &Range<usize>, min_gap: usize) {
    let end = (range.end + min_gap).min(blocked.len());
    for slot in &mut blocked[range.start.saturating_sub(min_gap)..end] {
        *slot = true;
    }
}

fn assemble((words, plans, relations, events): SentenceParts, min_gap: usize) -> SentenceSem {
    let mut blocked = vec![false; words.len()];
    let mut entities = Vec::new();

    for (i, plan) in plans.into_iter().enumerate() {
        let Some((label, len, split, nested)) = plan else {
            continue;
        };
        let Some(first) = free_run(&blocked, i, len) else {
            continue;
        };
        let mut fragments = vec![first.clone()];
        if let Some((gap, len)) = split {
            if let Some(second) = free_run(&blocked, first.end + gap, len) {
                fragments.push(second);
            }
        }
        for fragment in &fragments {
            block(&mut blocked, fragment, min_gap);
        }

        if let Some((a, b)) = nested {
            let (a, b) = (a.index(first.len()), b.index(first.len()));
            entities.push(EntitySem {
                label: ENTITY_LABELS[(label + 1) % ENTITY_LABELS.len()].to_string(),
                column: 1,
                fragments: vec![first.start + a.min(b)..first.start + a.max(b) + 1],
            });
        }
        entities.push(EntitySem {
            label: ENTITY_LABELS[label].to_string(),
            column: 0,
            fragments,
        });
    }
    entities.sort_by_key(|e| (e.first_token(), e.column));

    if entities.is_empty() {
        return SentenceSem {
            words,
            entities,
            relations: Vec::new(),
            events: Vec::new(),
        };
    }

    let count = entities.len();
    let mut relations: Vec<RelationSem> = relations
        .into_iter()
        .map(|(a, b, label)| RelationSem {
            label: RELATION_LABELS[label].to_string(),
            first: a.index(count),
            second: b.index(count),
        })
        .collect();
    relations.sort_by_key(|r| entities[r.first].first_token());

    let mut events: Vec<EventSem> = events
        .into_iter()
        .map(|(trigger, label, args)| EventSem {
            label: EVENT_LABELS[label].to_string(),
            trigger: trigger.index(count),
            args: args
                .into_iter()
                .map(|(i, role)| (EVENT_ROLES[role].to_string(), i.index(count)))
                .collect(),
        })
        .collect();
    events.sort_by_key(|e| entities[e.trigger].first_token());

    SentenceSem {
        words,
        entities,
        relations,
        events,
    }
}

/// Adjacent entities of one label cannot be told apart with `io` tags.
pub fn min_gap(scheme: &str) -> usize {
    usize::from(scheme == "io")
}

pub fn arb_document(
    max_sentences: usize,
    max_tokens: usize,
    min_gap: usize,
) -> impl Strategy<Value = SampleDoc> {
    prop::collection::vec(arb_sentence(max_tokens, min_gap), 1..=max_sentences)
        .prop_map(|sentences| SampleDoc { sentences })
}

pub fn arb_scheme() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SCHEMES.to_vec())
}

/// A tagging scheme and a document its tags can express.
pub fn arb_scheme_and_document(
    max_sentences: usize,
    max_tokens: usize,
) -> impl Strategy<Value = (&'static str, SampleDoc)> {
    arb_scheme().prop_flat_map(move |scheme| {
        (
            Just(scheme),
            arb_document(max_sentences, max_tokens, min_gap(scheme)),
        )
    })
}

/// The prefix letter of token `t` of `fragment`.
fn letter(scheme: &str, fragment: &Range<usize>, t: usize) -> char {
    let unit = fragment.len() == 1;
    let last = t + 1 == fragment.end;
    match scheme {
        "io" => 'I',
        "bilou" if unit => 'U',
        "bioes" if unit => 'S',
        _ if t == fragment.start => 'B',
        "bilou" if last => 'L',
        "bioes" if last => 'E',
        _ => 'I',
    }
}

fn cell(items: &[String]) -> String {
    if items.is_empty() {
        "NULL".to_string()
    } else {
        items.join("|")
    }
}

impl SentenceSem {
    fn tag_column(&self, scheme: &str, column: usize) -> Vec<String> {
        let mut tags = vec!["O".to_string(); self.words.len()];
        let mut group = 0;
        for entity in self.entities.iter().filter(|e| e.column == column) {
            let suffix = if entity.fragments.len() > 1 {
                group += 1;
                format!("#{}", group)
            } else {
                String::new()
            };
            for fragment in &entity.fragments {
                for t in fragment.clone() {
                    tags[t] = format!("{}-{}{}", letter(scheme, fragment, t), entity.label, suffix);
                }
            }
        }
        tags
    }

    fn relation_item(&self, index: usize) -> String {
        let r = &self.relations[index];
        format!("{}:{}:{}", r.label, r.first, r.second)
    }

    fn event_item(&self, index: usize) -> String {
        let e = &self.events[index];
        let mut item = format!("{}:{}", e.label, e.trigger);
        for (role, i) in &e.args {
            item.push_str(&format!(":{}={}", role, i));
        }
        item
    }

    fn render(&self, scheme: &str, s: usize, moved: Option<Moved>, out: &mut String) {
        let n = self.words.len();
        let outer = self.tag_column(scheme, 0);
        let inner = self.tag_column(scheme, 1);

        let mut relation_cells = vec![Vec::new(); n];
        for (i, r) in self.relations.iter().enumerate() {
            let row = match moved {
                Some(Moved::Relation { sentence, index, row }) if sentence == s && index == i => row,
                _ => self.entities[r.first].first_token(),
            };
            relation_cells[row].push(self.relation_item(i));
        }
        let mut event_cells = vec![Vec::new(); n];
        for (i, e) in self.events.iter().enumerate() {
            let row = match moved {
                Some(Moved::Event { sentence, index, row }) if sentence == s && index == i => row,
                _ => self.entities[e.trigger].first_token(),
            };
            event_cells[row].push(self.event_item(i));
        }

        for t in 0..n {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                self.words[t],
                outer[t],
                inner[t],
                cell(&relation_cells[t]),
                cell(&event_cells[t])
            ));
        }
    }
}

impl SampleDoc {
    fn render(&self, scheme: &str, moved: Option<Moved>) -> String {
        let mut out = String::new();
        for (s, sentence) in self.sentences.iter().enumerate() {
            if s > 0 {
                out.push('\n');
            }
            sentence.render(scheme, s, moved, &mut out);
        }
        out
    }

    /// OTPL in [`COLSPEC`] with every item on its anchor row.
    pub fn to_otpl(&self, scheme: &str) -> String {
        self.render(scheme, None)
    }

    /// Like [`SampleDoc::to_otpl`], but with one relation or event item
    /// (picked by `pick`) written on another row of its sentence.
    ///
    /// `None` if no sentence has both an item and a second row.
    pub fn to_otpl_misplacing(&self, scheme: &str, pick: Index, row: Index) -> Option<String> {
        let mut candidates = Vec::new();
        for (s, sentence) in self.sentences.iter().enumerate() {
            if sentence.words.len() < 2 {
                continue;
            }
            for (i, r) in sentence.relations.iter().enumerate() {
                let anchor = sentence.entities[r.first].first_token();
                candidates.push((s, anchor, Moved::Relation { sentence: s, index: i, row: 0 }));
            }
            for (i, e) in sentence.events.iter().enumerate() {
                let anchor = sentence.entities[e.trigger].first_token();
                candidates.push((s, anchor, Moved::Event { sentence: s, index: i, row: 0 }));
            }
        }
        if candidates.is_empty() {
            return None;
        }

        let (s, anchor, moved) = candidates[pick.index(candidates.len())];
        let target = row.index(self.sentences[s].words.len() - 1);
        let target = if target >= anchor { target + 1 } else { target };
        let moved = match moved {
            Moved::Relation { sentence, index, .. } => Moved::Relation { sentence, index, row: target },
            Moved::Event { sentence, index, .. } => Moved::Event { sentence, index, row: target },
        };
        Some(self.render(scheme, Some(moved)))
    }

    /// One token per line, sentences separated by blank lines.
    pub fn to_tokens(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.words.iter().map(|w| format!("{}\n", w)).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tokens joined by spaces, sentences by newlines.
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.words.join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Canonical standoff annotations over [`SampleDoc::text`].
    pub fn to_ann(&self) -> String {
        let mut entity_lines = Vec::new();
        let mut relation_lines = Vec::new();
        let mut event_lines = Vec::new();
        let mut offset = 0;
        for sentence in &self.sentences {
            let starts: Vec<usize> = sentence
                .words
                .iter()
                .scan(offset, |pos, w| {
                    let start = *pos;
                    *pos += w.len() + 1;
                    Some(start)
                })
                .collect();

            let first_id = entity_lines.len() + 1;
            for e in &sentence.entities {
                let offsets = e
                    .fragments
                    .iter()
                    .map(|f| {
                        let end = starts[f.end - 1] + sentence.words[f.end - 1].len();
                        format!("{} {}", starts[f.start], end)
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                entity_lines.push(format!(
                    "T{}\t{} {}\t{}",
                    entity_lines.len() + 1,
                    e.label,
                    offsets,
                    sentence.covered(e)
                ));
            }
            for r in &sentence.relations {
                relation_lines.push(format!(
                    "R{}\t{} Arg1:T{} Arg2:T{}",
                    relation_lines.len() + 1,
                    r.label,
                    first_id + r.first,
                    first_id + r.second
                ));
            }
            for e in &sentence.events {
                let mut line = format!(
                    "E{}\t{}:T{}",
                    event_lines.len() + 1,
                    e.label,
                    first_id + e.trigger
                );
                for (role, i) in &e.args {
                    line.push_str(&format!(" {}:T{}", role, first_id + i));
                }
                event_lines.push(line);
            }

            offset += sentence.words.iter().map(|w| w.len() + 1).sum::<usize>();
        }

        entity_lines
            .into_iter()
            .chain(relation_lines)
            .chain(event_lines)
            .map(|line| line + "\n")
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.sentences.iter().map(|s| s.entities.len()).sum()
    }

    pub fn relation_count(&self) -> usize {
        self.sentences.iter().map(|s| s.relations.len()).sum()
    }

    pub fn event_count(&self) -> usize {
        self.sentences.iter().map(|s| s.events.len()).sum()
    }

    /// Covered text of every entity, in document order.
    pub fn entity_texts(&self) -> Vec<String> {
        self.sentences
            .iter()
            .flat_map(|s| s.entities.iter().map(move |e| s.covered(e)))
            .collect()
    }
}

impl SentenceSem {
    /// Fragment texts joined by single spaces, as brat states them.
    fn covered(&self, entity: &EntitySem) -> String {
        entity
            .fragments
            .iter()
            .map(|f| self.words[f.clone()].join(" "))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
