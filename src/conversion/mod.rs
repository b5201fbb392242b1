//! Conversion between OTPL token rows and brat standoff annotations.
//!
//! [`OtplBratConverter`] works on [`Document`]s: OTPL→brat reads the tag
//! columns of a tokenized document into its annotation index, brat→OTPL
//! writes an annotation index into the tag columns of a tokenization.
//! Text-level helpers wrap both directions with the OTPL reader and
//! writer and the standoff parser and serializer.
//!
//! Entities are numbered per sentence in order of (start offset, entity
//! column); association cells refer to them by that number.

pub mod report;

pub use report::{
    ConversionCounts, ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity,
};

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::brat;
use crate::colspec::{guess_segments, registry, ColumnRole, ColumnSpecification};
use crate::config::Configuration;
use crate::error::{DataFormatError, ErrorKind};
use crate::model::{
    AnnotationIndex, AnnotationRef, Argument, Document, Entity, EntityId, Event, Fragment,
    Relation, Sentence,
};
use crate::otpl::association::{self, EventItem, Item, RelationItem};
use crate::otpl::reader::{self, Reading};
use crate::otpl::writer;
use crate::tagging::{self, TagSpan, OUTSIDE};

/// Tracing target for document conversions.
pub const TRACING_TARGET_CONVERSION: &str = "otplc::conversion";

/// A conversion result and what happened on the way.
#[derive(Clone, Debug)]
pub struct Converted<T> {
    pub value: T,
    pub report: ConversionReport,
}

/// The two files of a brat document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BratFiles {
    /// Standoff annotations (`.ann`).
    pub ann: String,
    /// The text the offsets refer to (`.txt`).
    pub text: String,
}

/// Where an entity ended up in the OTPL rows.
#[derive(Clone, Copy, Debug)]
struct Placement {
    sentence: usize,
    /// First token of the first fragment.
    token: usize,
    /// Sentence-local entity number.
    local: usize,
}

/// A sentence-local entity read from the tag columns.
#[derive(Clone, Copy, Debug)]
struct LocalEntity {
    /// `None` if the entity was dropped in lenient mode.
    id: Option<EntityId>,
    /// First token of the first fragment; association items live on its row.
    token: usize,
}

/// An entity mapped onto the tokens of one sentence.
struct Located {
    id: EntityId,
    label: String,
    /// Disjoint token ranges, sorted.
    tokens: Vec<Range<usize>>,
}

/// Bidirectional OTPL ⇄ brat converter for one configuration.
///
/// The converter holds no per-document state, so one instance can be
/// shared by threads converting different documents.
#[derive(Clone, Debug, Default)]
pub struct OtplBratConverter {
    config: Configuration,
}

impl OtplBratConverter {
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Reconstructs entities, relations and events from the tag columns of
    /// `document`.
    ///
    /// Entities come from each ENTITY_TAG column by a tagging-scheme state
    /// machine (see [`tagging::decode`]); relations and events are read
    /// from RELATION_TAG and EVENT_TAG cells afterwards, in row then column
    /// order, and refer to the entities of their sentence by number.
    /// The returned document has the same text and tokens and a new
    /// annotation index.
    pub fn otpl_to_brat(&self, document: &Document) -> Result<Converted<Document>, DataFormatError> {
        document.check_tokens()?;

        let policy = self.config.policy();
        let colspec = &document.colspec;
        let entity_columns: Vec<usize> = colspec.columns(ColumnRole::EntityTag).collect();
        let association_columns: Vec<(usize, ColumnRole)> = colspec
            .roles()
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, role)| role.is_association())
            .collect();

        let mut warnings = Vec::new();
        let mut index = AnnotationIndex::new();

        for (s, sentence) in document.sentences.iter().enumerate() {
            let number = s + 1;

            let mismatch = sentence.tokens.iter().find_map(|token| {
                colspec
                    .validate(&token.columns)
                    .err()
                    .map(|err| err.at_line(token.line).in_sentence(number))
            });
            if let Some(err) = mismatch {
                policy.recover(err, &mut warnings)?;
                continue;
            }

            let local = self.decode_entities(
                document,
                sentence,
                number,
                &entity_columns,
                &mut index,
                &mut warnings,
            )?;
            self.decode_associations(
                sentence,
                number,
                &association_columns,
                &local,
                &mut index,
                &mut warnings,
            )?;
        }

        let mut report = ConversionReport::new("otpl", "brat");
        report.input = ConversionCounts::of(document);
        report.add_recovered(warnings);

        let converted = Document {
            text: document.text.clone(),
            colspec: document.colspec.clone(),
            sentences: document.sentences.clone(),
            annotations: index,
        };
        report.output = ConversionCounts::of(&converted);

        tracing::debug!(
            target: TRACING_TARGET_CONVERSION,
            sentences = converted.sentences.len(),
            entities = converted.annotations.entities.len(),
            relations = converted.annotations.relations.len(),
            events = converted.annotations.events.len(),
            warnings = report.warning_count(),
            "converted OTPL to brat"
        );

        Ok(Converted {
            value: converted,
            report,
        })
    }

    /// Decodes every entity column of a sentence into `index`.
    ///
    /// Returns the entities in sentence-local order; entities dropped in
    /// lenient mode keep their number.
    fn decode_entities(
        &self,
        document: &Document,
        sentence: &Sentence,
        number: usize,
        entity_columns: &[usize],
        index: &mut AnnotationIndex,
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<Vec<LocalEntity>, DataFormatError> {
        let policy = self.config.policy();
        let tokens = &sentence.tokens;

        let mut candidates: Vec<(usize, usize, TagSpan)> = Vec::new();
        for (position, &column) in entity_columns.iter().enumerate() {
            let tags: Vec<&str> = tokens.iter().map(|t| t.columns[column].as_str()).collect();
            let decoded = tagging::decode(&tags, self.config.scheme());
            for problem in decoded.problems {
                let err = DataFormatError::new(
                    ErrorKind::MalformedTagSequence,
                    format!("column {}: {}", column + 1, problem.message),
                )
                .at_line(tokens[problem.index].line)
                .in_sentence(number);
                policy.recover(err, warnings)?;
            }
            for span in decoded.spans {
                if span.fragments.is_empty() {
                    continue;
                }
                candidates.push((tokens[span.first_token()].start, position, span));
            }
        }
        candidates.sort_by_key(|(start, position, _)| (*start, *position));

        let mut local = Vec::with_capacity(candidates.len());
        for (_, _, span) in candidates {
            let token = span.first_token();
            let line = tokens[token].line;
            let label = self.config.labels().to_brat(&span.label);
            if !brat::is_valid_name(label) {
                let err = DataFormatError::new(
                    ErrorKind::InvalidLabel,
                    format!("'{}' is not a valid brat type name", label),
                )
                .at_line(line)
                .in_sentence(number);
                policy.recover(err, warnings)?;
                local.push(LocalEntity { id: None, token });
                continue;
            }

            let fragments = span
                .fragments
                .iter()
                .map(|range| Fragment::new(tokens[range.start].start, tokens[range.end - 1].end))
                .collect();
            let id = index.next_entity_id();
            let mut entity = Entity::new(id, label, fragments);
            let text = entity.covered_text(&document.text).ok_or_else(|| {
                DataFormatError::new(
                    ErrorKind::TextMismatch,
                    format!("{} [{}, {}) lies outside the text", id, entity.start(), entity.end()),
                )
                .at_line(line)
                .in_sentence(number)
            })?;
            entity.text = Some(text);
            index.insert_entity(entity);
            local.push(LocalEntity {
                id: Some(id),
                token,
            });
        }

        Ok(local)
    }

    /// Reads the association cells of a sentence into `index`.
    ///
    /// An item belongs on the row of its first argument (relations) or its
    /// trigger (events); anywhere else it is a
    /// [`ErrorKind::MalformedTagSequence`], which lenient mode accepts as if
    /// the item were on its own row.
    fn decode_associations(
        &self,
        sentence: &Sentence,
        number: usize,
        columns: &[(usize, ColumnRole)],
        local: &[LocalEntity],
        index: &mut AnnotationIndex,
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<(), DataFormatError> {
        let policy = self.config.policy();

        for (row, token) in sentence.tokens.iter().enumerate() {
            for &(column, role) in columns {
                let located = |kind: ErrorKind, message: String| {
                    DataFormatError::new(kind, format!("column {}: {}", column + 1, message))
                        .at_line(token.line)
                        .in_sentence(number)
                };

                let items =
                    match association::parse_cell(&token.columns[column], self.config.empty_marker()) {
                        Ok(items) => items,
                        Err(message) => {
                            policy.recover(located(ErrorKind::MalformedTagSequence, message), warnings)?;
                            continue;
                        }
                    };

                for item in &items {
                    if let Err((kind, message)) = self.insert_item(item, role, local, index) {
                        policy.recover(located(kind, message), warnings)?;
                        continue;
                    }
                    let anchor = item.anchor();
                    if let Some(owner) = local.get(anchor).filter(|e| e.token != row) {
                        let message = format!(
                            "'{}' belongs on the row of entity {} (line {})",
                            item, anchor, sentence.tokens[owner.token].line
                        );
                        policy.recover(located(ErrorKind::MalformedTagSequence, message), warnings)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn insert_item(
        &self,
        item: &Item,
        role: ColumnRole,
        local: &[LocalEntity],
        index: &mut AnnotationIndex,
    ) -> Result<(), (ErrorKind, String)> {
        let resolve = |i: usize| match local.get(i).map(|e| e.id) {
            Some(Some(id)) => Ok(id),
            Some(None) => Err((
                ErrorKind::DanglingReference,
                format!("'{}': entity {} was dropped", item, i),
            )),
            None => Err((
                ErrorKind::DanglingReference,
                format!(
                    "'{}': entity index {} is outside [0, {})",
                    item,
                    i,
                    local.len()
                ),
            )),
        };
        let check_name = |name: &str| {
            if brat::is_valid_name(name) {
                Ok(())
            } else {
                Err((
                    ErrorKind::InvalidLabel,
                    format!("'{}': '{}' is not a valid brat name", item, name),
                ))
            }
        };

        let label = self.config.labels().to_brat(item.label());
        check_name(label)?;

        match (item, role) {
            (Item::Relation(relation), ColumnRole::RelationTag) => {
                let [(r1, a), (r2, b)] = &relation.args;
                check_name(r1)?;
                check_name(r2)?;
                let args = [
                    Argument::new(r1.as_str(), resolve(*a)?),
                    Argument::new(r2.as_str(), resolve(*b)?),
                ];
                let id = index.next_relation_id();
                index.insert_relation(Relation::new(id, label, args));
                Ok(())
            }
            (Item::Event(event), ColumnRole::EventTag) => {
                let trigger = resolve(event.trigger)?;
                let mut args = Vec::with_capacity(event.args.len());
                for (arg_role, i) in &event.args {
                    check_name(arg_role)?;
                    args.push(Argument::new(arg_role.as_str(), resolve(*i)?));
                }
                let id = index.next_event_id();
                index.insert_event(Event::new(id, label, trigger, args));
                Ok(())
            }
            (Item::Relation(_), _) => Err((
                ErrorKind::MalformedTagSequence,
                format!("'{}' is a relation outside a RELATION_TAG column", item),
            )),
            (Item::Event(_), _) => Err((
                ErrorKind::MalformedTagSequence,
                format!("'{}' is an event outside an EVENT_TAG column", item),
            )),
        }
    }

    /// Writes the annotation index of `document` into the tag columns of
    /// its tokenization.
    ///
    /// The target colspec is the configured one, else the document's own
    /// if it has tag columns, else the smallest registry variant that can
    /// hold the annotations. Each entity fragment is mapped to the tokens it
    /// covers; a boundary strictly inside a token is
    /// [`ErrorKind::EntitySpanMisaligned`] (lenient mode widens the
    /// fragment to whole tokens). Overlapping entities are spread over the
    /// ENTITY_TAG columns, outermost first. Relations are written on the
    /// row of their first argument, events on the row of their trigger.
    ///
    /// The returned document has the same text and sentences, new token
    /// columns and an empty annotation index.
    pub fn brat_to_otpl(&self, document: &Document) -> Result<Converted<Document>, DataFormatError> {
        document.check_tokens()?;
        for entity in document.annotations.entities.values() {
            check_entity_text(entity, document)?;
        }

        let mut report = ConversionReport::new("brat", "otpl");
        report.input = ConversionCounts::of(document);
        let colspec = self.target_colspec(document, &mut report);
        self.note_lossy(&document.annotations, &colspec, &mut report);

        let mut warnings = Vec::new();
        let mut rows = self.blank_rows(document, &colspec);
        let placements = self.place_entities(document, &colspec, &mut rows, &mut warnings)?;
        let (relations, events) =
            self.place_associations(document, &colspec, &placements, &mut rows, &mut warnings)?;
        report.add_recovered(warnings);

        let sentences = document
            .sentences
            .iter()
            .zip(rows)
            .map(|(sentence, rows)| {
                let mut sentence = sentence.clone();
                for (token, columns) in sentence.tokens.iter_mut().zip(rows) {
                    token.columns = columns;
                }
                sentence
            })
            .collect();
        let converted = Document {
            text: document.text.clone(),
            colspec,
            sentences,
            annotations: AnnotationIndex::new(),
        };

        report.output = ConversionCounts {
            entities: placements.len(),
            relations,
            events,
            ..ConversionCounts::of(&converted)
        };

        tracing::debug!(
            target: TRACING_TARGET_CONVERSION,
            colspec = %converted.colspec,
            sentences = converted.sentences.len(),
            entities = placements.len(),
            relations,
            events,
            warnings = report.warning_count(),
            "converted brat to OTPL"
        );

        Ok(Converted {
            value: converted,
            report,
        })
    }

    fn target_colspec(&self, document: &Document, report: &mut ConversionReport) -> ColumnSpecification {
        if let Some(colspec) = self.config.colspec() {
            return colspec.clone();
        }
        if !document.colspec.is_tokens_only() {
            return document.colspec.clone();
        }

        let annotations = &document.annotations;
        let variant = registry::covering(
            !annotations.relations.is_empty(),
            !annotations.events.is_empty(),
        );
        report.add(ConversionIssue::info(
            ConversionIssueCode::CoveringColspec,
            format!("no colspec given; using '{}' ({})", variant.name, variant.colspec()),
        ));
        variant.colspec()
    }

    fn note_lossy(&self, annotations: &AnnotationIndex, colspec: &ColumnSpecification, report: &mut ConversionReport) {
        let missing = [
            (ColumnRole::EntityTag, annotations.entities.len(), "entities", ConversionIssueCode::DropEntities),
            (ColumnRole::RelationTag, annotations.relations.len(), "relations", ConversionIssueCode::DropRelations),
            (ColumnRole::EventTag, annotations.events.len(), "events", ConversionIssueCode::DropEvents),
        ];
        for (role, count, what, code) in missing {
            if count > 0 && !colspec.has(role) {
                report.add(ConversionIssue::warning(
                    code,
                    format!("{} {} dropped: colspec '{}' has no {} column", count, what, colspec, role),
                ));
            }
        }

        if !annotations.supplements.is_empty() {
            let mut kinds: Vec<&str> = annotations.supplements.iter().map(|s| s.kind.name()).collect();
            kinds.sort_unstable();
            kinds.dedup();
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DropSupplements,
                format!(
                    "{} supplementary record(s) dropped ({})",
                    annotations.supplements.len(),
                    kinds.join(", ")
                ),
            ));
        }

        if self.config.output_scheme().is_coarser_than(self.config.scheme()) {
            report.add(ConversionIssue::warning(
                ConversionIssueCode::LossyOutputScheme,
                format!(
                    "writing {} tags; adjacent entities of one label merge",
                    self.config.output_scheme()
                ),
            ));
        }
    }

    /// Rows of every sentence with text and, when the tokenization has the
    /// target arity, its feature columns filled in.
    fn blank_rows(&self, document: &Document, colspec: &ColumnSpecification) -> Vec<Vec<Vec<String>>> {
        let marker = self.config.empty_marker();
        let text_column = colspec.text_column();
        let keep_features = document.colspec.arity() == colspec.arity();

        document
            .sentences
            .iter()
            .map(|sentence| {
                sentence
                    .tokens
                    .iter()
                    .map(|token| {
                        colspec
                            .roles()
                            .iter()
                            .enumerate()
                            .map(|(column, role)| match role {
                                ColumnRole::Text if column == text_column => token.text.clone(),
                                ColumnRole::EntityTag => OUTSIDE.to_string(),
                                ColumnRole::Feature if keep_features => token
                                    .columns
                                    .get(column)
                                    .cloned()
                                    .unwrap_or_else(|| marker.to_string()),
                                _ => marker.to_string(),
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// Maps an entity's fragments onto the tokens of one sentence.
    ///
    /// Returns `None` if the entity was dropped in lenient mode.
    fn locate(
        &self,
        document: &Document,
        entity: &Entity,
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<Option<(usize, Vec<Range<usize>>)>, DataFormatError> {
        let policy = self.config.policy();
        let mut sentence = None;
        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(entity.fragments.len());
        let misaligned = |message: String, sentence: Option<usize>| {
            let err = DataFormatError::new(ErrorKind::EntitySpanMisaligned, message);
            match sentence {
                Some(s) => err.in_sentence(s + 1),
                None => err,
            }
        };

        for fragment in &entity.fragments {
            let Some(s) = document.sentence_containing(fragment.start, fragment.end) else {
                policy.recover(
                    misaligned(
                        format!(
                            "{} [{}, {}) does not lie within one sentence",
                            entity.id, fragment.start, fragment.end
                        ),
                        sentence,
                    ),
                    warnings,
                )?;
                return Ok(None);
            };
            let first = *sentence.get_or_insert(s);
            if first != s {
                policy.recover(
                    misaligned(
                        format!("{} has fragments in more than one sentence", entity.id),
                        sentence,
                    ),
                    warnings,
                )?;
                return Ok(None);
            }

            let tokens = &document.sentences[s].tokens;
            let first = tokens.partition_point(|t| t.end <= fragment.start);
            let last = tokens.partition_point(|t| t.start < fragment.end);
            if first >= last {
                policy.recover(
                    misaligned(
                        format!(
                            "{} [{}, {}) covers no token",
                            entity.id, fragment.start, fragment.end
                        ),
                        sentence,
                    ),
                    warnings,
                )?;
                return Ok(None);
            }

            let (head, tail) = (&tokens[first], &tokens[last - 1]);
            if head.start < fragment.start || tail.end > fragment.end {
                let boundary = if head.start < fragment.start {
                    fragment.start
                } else {
                    fragment.end
                };
                let token = if head.start < fragment.start { head } else { tail };
                policy.recover(
                    misaligned(
                        format!(
                            "{} [{}, {}): offset {} falls inside token '{}' [{}, {})",
                            entity.id,
                            fragment.start,
                            fragment.end,
                            boundary,
                            token.text,
                            token.start,
                            token.end
                        ),
                        sentence,
                    )
                    .at_line(token.line),
                    warnings,
                )?;
            }
            ranges.push(first..last);
        }

        let Some(sentence) = sentence else {
            return Ok(None);
        };
        ranges.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(previous) if range.start < previous.end => {
                    previous.end = previous.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        Ok(Some((sentence, merged)))
    }

    /// Tags every locatable entity into the ENTITY_TAG columns.
    fn place_entities(
        &self,
        document: &Document,
        colspec: &ColumnSpecification,
        rows: &mut [Vec<Vec<String>>],
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<HashMap<EntityId, Placement>, DataFormatError> {
        let policy = self.config.policy();
        let entity_columns: Vec<usize> = colspec.columns(ColumnRole::EntityTag).collect();
        let mut placements = HashMap::new();
        if entity_columns.is_empty() {
            return Ok(placements);
        }

        let mut per_sentence: Vec<Vec<Located>> = Vec::new();
        per_sentence.resize_with(document.sentences.len(), Vec::new);
        for entity in document.annotations.entities.values() {
            let label = self.config.labels().to_otpl(&entity.label);
            if !association::is_writable_name(label) || label.contains('#') {
                policy.recover(
                    DataFormatError::new(
                        ErrorKind::InvalidLabel,
                        format!("{}: '{}' cannot be written as an entity tag", entity.id, label),
                    ),
                    warnings,
                )?;
                continue;
            }
            if let Some((s, tokens)) = self.locate(document, entity, warnings)? {
                per_sentence[s].push(Located {
                    id: entity.id,
                    label: label.to_string(),
                    tokens,
                });
            }
        }

        for (s, mut located) in per_sentence.into_iter().enumerate() {
            let sentence = &document.sentences[s];
            let len = sentence.tokens.len();

            // outermost first: earliest start, then widest
            located.sort_by_key(|l| (l.tokens[0].start, Reverse(l.tokens[l.tokens.len() - 1].end), l.id));

            let mut occupied = vec![vec![false; len]; entity_columns.len()];
            let mut layers: Vec<Vec<Located>> = Vec::new();
            layers.resize_with(entity_columns.len(), Vec::new);

            for entity in located {
                let free = (0..entity_columns.len()).find(|&c| {
                    entity
                        .tokens
                        .iter()
                        .flat_map(|r| r.clone())
                        .all(|t| !occupied[c][t])
                });
                match free {
                    Some(c) => {
                        for t in entity.tokens.iter().flat_map(|r| r.clone()) {
                            occupied[c][t] = true;
                        }
                        layers[c].push(entity);
                    }
                    None => {
                        let token = &sentence.tokens[entity.tokens[0].start];
                        policy.recover(
                            DataFormatError::new(
                                ErrorKind::EntityOverlap,
                                format!(
                                    "{} overlaps other entities in all {} ENTITY_TAG column(s)",
                                    entity.id,
                                    entity_columns.len()
                                ),
                            )
                            .at_line(token.line)
                            .in_sentence(s + 1),
                            warnings,
                        )?;
                    }
                }
            }

            let mut order: Vec<(usize, usize, EntityId, usize)> = Vec::new();
            for (position, layer) in layers.iter_mut().enumerate() {
                layer.sort_by_key(|l| l.tokens[0].start);
                let mut spans: Vec<TagSpan> = layer
                    .iter()
                    .map(|l| TagSpan::new(l.label.clone(), l.tokens.clone()))
                    .collect();
                tagging::number_groups(&mut spans);
                let tags = tagging::encode(&spans, len, self.config.output_scheme());
                let column = entity_columns[position];
                for (row, tag) in rows[s].iter_mut().zip(tags) {
                    row[column] = tag;
                }
                for l in layer.iter() {
                    let first = l.tokens[0].start;
                    order.push((sentence.tokens[first].start, position, l.id, first));
                }
            }

            order.sort_unstable();
            for (local, (_, _, id, token)) in order.into_iter().enumerate() {
                placements.insert(
                    id,
                    Placement {
                        sentence: s,
                        token,
                        local,
                    },
                );
            }
        }

        Ok(placements)
    }

    /// Writes relation and event items; returns how many of each were placed.
    fn place_associations(
        &self,
        document: &Document,
        colspec: &ColumnSpecification,
        placements: &HashMap<EntityId, Placement>,
        rows: &mut [Vec<Vec<String>>],
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<(usize, usize), DataFormatError> {
        let policy = self.config.policy();
        let annotations = &document.annotations;
        let relation_column = colspec.columns(ColumnRole::RelationTag).next();
        let event_column = colspec.columns(ColumnRole::EventTag).next();
        let mut cells: BTreeMap<(usize, usize, usize), Vec<Item>> = BTreeMap::new();
        let (mut relations, mut events) = (0, 0);

        if let Some(column) = relation_column {
            for relation in annotations.relations.values() {
                match self.relation_item(relation, annotations, placements) {
                    Ok((at, item)) => {
                        cells.entry((at.sentence, at.token, column)).or_default().push(item);
                        relations += 1;
                    }
                    Err((kind, message)) => {
                        policy.recover(DataFormatError::new(kind, message), warnings)?;
                    }
                }
            }
        }

        if let Some(column) = event_column {
            for event in annotations.events.values() {
                match self.event_item(event, annotations, placements) {
                    Ok((at, item)) => {
                        cells.entry((at.sentence, at.token, column)).or_default().push(item);
                        events += 1;
                    }
                    Err((kind, message)) => {
                        policy.recover(DataFormatError::new(kind, message), warnings)?;
                    }
                }
            }
        }

        let marker = self.config.empty_marker();
        for ((s, t, column), items) in cells {
            rows[s][t][column] = association::render_cell(&items, marker);
        }

        Ok((relations, events))
    }

    fn relation_item(
        &self,
        relation: &Relation,
        annotations: &AnnotationIndex,
        placements: &HashMap<EntityId, Placement>,
    ) -> Result<(Placement, Item), (ErrorKind, String)> {
        let owner = relation.id.to_string();
        let label = self.otpl_name(&owner, &relation.label)?;
        let [a, b] = &relation.args;
        let first = place_argument(&owner, &a.target, annotations, placements)?;
        let second = place_argument(&owner, &b.target, annotations, placements)?;
        if first.sentence != second.sentence {
            return Err((
                ErrorKind::DanglingReference,
                format!("{}: arguments lie in different sentences", owner),
            ));
        }

        let item = Item::Relation(RelationItem {
            label,
            args: [
                (self.otpl_name(&owner, &a.role)?, first.local),
                (self.otpl_name(&owner, &b.role)?, second.local),
            ],
        });
        Ok((first, item))
    }

    fn event_item(
        &self,
        event: &Event,
        annotations: &AnnotationIndex,
        placements: &HashMap<EntityId, Placement>,
    ) -> Result<(Placement, Item), (ErrorKind, String)> {
        let owner = event.id.to_string();
        let label = self.otpl_name(&owner, &event.label)?;
        let trigger = place_argument(
            &owner,
            &AnnotationRef::Entity(event.trigger),
            annotations,
            placements,
        )?;

        let mut args = Vec::with_capacity(event.args.len());
        for arg in &event.args {
            let at = place_argument(&owner, &arg.target, annotations, placements)?;
            if at.sentence != trigger.sentence {
                return Err((
                    ErrorKind::DanglingReference,
                    format!("{}: argument {} lies in another sentence", owner, arg),
                ));
            }
            args.push((self.otpl_name(&owner, &arg.role)?, at.local));
        }

        let item = Item::Event(EventItem {
            label,
            trigger: trigger.local,
            args,
        });
        Ok((trigger, item))
    }

    fn otpl_name(&self, owner: &str, name: &str) -> Result<String, (ErrorKind, String)> {
        let name = self.config.labels().to_otpl(name);
        if association::is_writable_name(name) {
            Ok(name.to_string())
        } else {
            Err((
                ErrorKind::InvalidLabel,
                format!("{}: '{}' cannot be written in an association cell", owner, name),
            ))
        }
    }

    /// Reads OTPL text, aligns it to `text` if given, and converts it to
    /// standoff annotations.
    ///
    /// Without `text` the synthesized text of the reader is returned.
    pub fn otpl_text_to_brat(
        &self,
        otpl: &str,
        text: Option<&str>,
    ) -> Result<Converted<BratFiles>, DataFormatError> {
        let Reading {
            mut document,
            warnings,
            guess,
        } = reader::read_auto(otpl, &self.config)?;

        let mut notes = Vec::new();
        match text {
            Some(text) => document.align_to_text(text)?,
            None => notes.push(ConversionIssue::info(
                ConversionIssueCode::SynthesizedText,
                "no text given; offsets refer to the synthesized text",
            )),
        }
        if let Some(guess) = guess {
            notes.push(guessed(&guess.colspec, guess.variant));
        }

        let Converted { value, mut report } = self.otpl_to_brat(&document)?;
        prepend(&mut report, warnings, notes);

        Ok(Converted {
            value: BratFiles {
                ann: brat::serialize(&value.annotations),
                text: value.text.as_str().to_string(),
            },
            report,
        })
    }

    /// Parses standoff annotations and writes them as OTPL onto the
    /// tokenization in `tokens`, aligned to `text`.
    ///
    /// `tokens` is OTPL text: a single TEXT column, or rows whose colspec
    /// is configured or can be guessed.
    pub fn brat_text_to_otpl(
        &self,
        ann: &str,
        text: &str,
        tokens: &str,
    ) -> Result<Converted<String>, DataFormatError> {
        let parsed = brat::parse(ann, self.config.policy())?;
        let Reading {
            mut document,
            mut warnings,
            guess,
        } = self.read_tokens(tokens)?;
        document.align_to_text(text)?;
        document.annotations = parsed.annotations;

        let mut notes = Vec::new();
        if let Some(guess) = guess {
            notes.push(guessed(&guess.colspec, guess.variant));
        }

        let Converted { value, mut report } = self.brat_to_otpl(&document)?;
        let mut recovered = parsed.warnings;
        recovered.append(&mut warnings);
        prepend(&mut report, recovered, notes);

        Ok(Converted {
            value: writer::write(&value, &self.config),
            report,
        })
    }

    fn read_tokens(&self, tokens: &str) -> Result<Reading, DataFormatError> {
        let segmented = reader::segment(tokens, &self.config);

        if segmented.header.is_none() {
            match segmented.arity() {
                None | Some(1) => {
                    return reader::read_segments(
                        &segmented,
                        &ColumnSpecification::text_only(),
                        &self.config,
                    )
                }
                Some(arity) => {
                    if let Some(colspec) = self.config.colspec().filter(|c| c.arity() == arity) {
                        return reader::read_segments(&segmented, colspec, &self.config);
                    }
                }
            }
        }

        let guess = guess_segments(&segmented, &self.config)?;
        let mut reading = reader::read_segments(&segmented, &guess.colspec, &self.config)?;
        reading.guess = Some(guess);
        Ok(reading)
    }
}

fn guessed(colspec: &ColumnSpecification, variant: Option<&str>) -> ConversionIssue {
    let message = match variant {
        Some(name) => format!("guessed colspec '{}' ({})", name, colspec),
        None => format!("colspec '{}' from header", colspec),
    };
    ConversionIssue::info(ConversionIssueCode::GuessedColspec, message)
}

/// Puts reader or parser warnings and notes before the converter's issues.
fn prepend(report: &mut ConversionReport, warnings: Vec<DataFormatError>, notes: Vec<ConversionIssue>) {
    let mut issues: Vec<ConversionIssue> = warnings.into_iter().map(ConversionIssue::recovered).collect();
    issues.extend(notes);
    issues.append(&mut report.issues);
    report.issues = issues;
}

fn check_entity_text(entity: &Entity, document: &Document) -> Result<(), DataFormatError> {
    let covered = entity.covered_text(&document.text).ok_or_else(|| {
        DataFormatError::new(
            ErrorKind::TextMismatch,
            format!(
                "{} [{}, {}) lies outside the text of {} characters",
                entity.id,
                entity.start(),
                entity.end(),
                document.text.char_len()
            ),
        )
    })?;
    match &entity.text {
        Some(stated) if *stated != covered => Err(DataFormatError::new(
            ErrorKind::TextMismatch,
            format!("{} states '{}' but covers '{}'", entity.id, stated, covered),
        )),
        _ => Ok(()),
    }
}

fn place_argument(
    owner: &str,
    target: &AnnotationRef,
    annotations: &AnnotationIndex,
    placements: &HashMap<EntityId, Placement>,
) -> Result<Placement, (ErrorKind, String)> {
    match target {
        AnnotationRef::Entity(id) => placements.get(id).copied().ok_or_else(|| {
            let message = if annotations.entities.contains_key(id) {
                format!("{}: entity {} was not written", owner, id)
            } else {
                format!("{}: entity {} does not exist", owner, id)
            };
            (ErrorKind::DanglingReference, message)
        }),
        other => Err((
            ErrorKind::DanglingReference,
            format!("{}: {} is not an entity", owner, other),
        )),
    }
}
