//! JSON document builder
//!
//! Turns a normalized record set into the deck forest and metadata. The
//! work is split into the three pipeline stages it spans so progress and
//! cancellation can be reported between records:
//!
//! 1. `clean_notes` runs text extraction over every note (Extracting)
//! 2. `build_cards` classifies and shapes output cards (Transforming)
//! 3. `assemble` builds the forest and metadata (Building)

pub mod cloze;
pub mod hierarchy;
pub mod text;

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::conversion::ConversionConfig;
use crate::error::ConversionResult;
use crate::model::{
    Card, CardContent, CardStats, ConversionMetadata, ConversionOutput, Deck, NormalizedRecordSet,
    Note, NoteType, OutputCard,
};
use crate::parser::SourceFormat;
use hierarchy::DeckEntry;

pub use cloze::ClozeNote;
pub use text::extract;

static TEMPLATE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid template pattern"));

/// Called with `(done, total)` after each record; an error aborts the stage
pub type Tick<'t> = &'t mut dyn FnMut(usize, usize) -> ConversionResult<()>;

/// Note fields after text extraction, keyed by note id
pub type CleanedNotes = HashMap<i64, Vec<String>>;

/// Sort key of a card inside its deck: `(note id, template ordinal)`
type CardKey = (i64, u32);

/// Output cards grouped by source deck id, with counters for metadata
#[derive(Debug, Default)]
pub struct BuiltCards {
    by_deck: BTreeMap<i64, Vec<(CardKey, OutputCard)>>,
    /// Source cards represented in the output
    pub included: usize,
    /// Source cards left out (suspended)
    pub excluded: usize,
    note_ids: BTreeSet<i64>,
    note_type_ids: BTreeSet<i64>,
}

impl BuiltCards {
    pub fn output_cards(&self) -> usize {
        self.by_deck.values().map(Vec::len).sum()
    }
}

pub struct JsonBuilder<'a> {
    config: &'a ConversionConfig,
}

impl<'a> JsonBuilder<'a> {
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self { config }
    }

    /// Build the whole document in one call
    pub fn build(
        &self,
        records: &NormalizedRecordSet,
        source_format: SourceFormat,
    ) -> ConversionResult<ConversionOutput> {
        let mut no_tick = |_: usize, _: usize| -> ConversionResult<()> { Ok(()) };
        let cleaned = self.clean_notes(records, &mut no_tick)?;
        let cards = self.build_cards(records, &cleaned, &mut no_tick)?;
        let (decks, metadata) = self.assemble(records, cards, source_format);
        Ok(ConversionOutput { decks, metadata })
    }

    /// Run text extraction over every note's fields
    pub fn clean_notes(
        &self,
        records: &NormalizedRecordSet,
        tick: Tick<'_>,
    ) -> ConversionResult<CleanedNotes> {
        let total = records.notes.len();
        let mut cleaned = HashMap::with_capacity(total);
        for (done, note) in records.notes.iter().enumerate() {
            cleaned.insert(note.id, text::extract_fields(&note.fields));
            tick(done + 1, total)?;
        }
        Ok(cleaned)
    }

    /// Classify each card and shape its output
    pub fn build_cards(
        &self,
        records: &NormalizedRecordSet,
        cleaned: &CleanedNotes,
        tick: Tick<'_>,
    ) -> ConversionResult<BuiltCards> {
        let notes: HashMap<i64, &Note> = records.notes.iter().map(|n| (n.id, n)).collect();

        let mut ordered: Vec<&Card> = records.cards.iter().collect();
        ordered.sort_by_key(|c| (c.note_id, c.template_ordinal, c.id));

        let mut built = BuiltCards::default();
        // (deck, note) -> position of the merged cloze card in that deck
        let mut cloze_slots: HashMap<(i64, i64), usize> = HashMap::new();
        let total = ordered.len();

        for (done, card) in ordered.into_iter().enumerate() {
            tick(done + 1, total)?;

            let suspended = card.queue_state.is_suspended();
            if suspended && !self.config.include_suspended {
                built.excluded += 1;
                continue;
            }
            let Some(note) = notes.get(&card.note_id) else {
                built.excluded += 1;
                continue;
            };
            let fallback;
            let note_type = match records.note_types.get(&note.note_type_id) {
                Some(note_type) => note_type,
                None => {
                    fallback = NoteType::placeholder(note.note_type_id, note.fields.len());
                    &fallback
                }
            };
            let fields = cleaned
                .get(&note.id)
                .cloned()
                .unwrap_or_else(|| text::extract_fields(&note.fields));

            built.included += 1;
            built.note_ids.insert(note.id);
            built.note_type_ids.insert(note.note_type_id);
            let deck_cards = built.by_deck.entry(card.deck_id).or_default();

            if note_type.is_cloze() {
                if let Some(&slot) = cloze_slots.get(&(card.deck_id, note.id)) {
                    let (_, existing) = &mut deck_cards[slot];
                    existing.id = existing.id.min(card.id);
                    if let Some(flag) = existing.suspended.as_mut() {
                        *flag = *flag && suspended;
                    }
                    continue;
                }
                cloze_slots.insert((card.deck_id, note.id), deck_cards.len());
            }

            let content = self.card_content(note_type, card, fields);
            let output = OutputCard {
                id: card.id,
                content,
                tags: note.tags.clone(),
                stats: self.config.include_stats.then(|| CardStats {
                    queue: card.queue_state,
                    due: card.due,
                    interval: card.interval,
                    ease_factor: card.ease_factor,
                    repetitions: card.repetitions,
                    lapses: card.lapses,
                }),
                suspended: self.config.include_suspended.then_some(suspended),
            };
            deck_cards.push(((note.id, card.template_ordinal), output));
        }

        tracing::debug!(
            "built {} output cards from {} source cards ({} excluded)",
            built.output_cards(),
            built.included,
            built.excluded
        );
        Ok(built)
    }

    /// Place cards into the deck forest and compute metadata
    pub fn assemble(
        &self,
        records: &NormalizedRecordSet,
        mut cards: BuiltCards,
        source_format: SourceFormat,
    ) -> (Vec<Deck>, ConversionMetadata) {
        // Distinct stored names can normalize to one path
        let mut by_path: BTreeMap<Vec<String>, (String, Vec<(CardKey, OutputCard)>)> =
            BTreeMap::new();
        for deck in records.decks.values() {
            let slot = by_path
                .entry(hierarchy::split_deck_name(&deck.name))
                .or_default();
            if slot.0.is_empty() {
                slot.0 = text::extract(&deck.description);
            }
            if let Some(deck_cards) = cards.by_deck.remove(&deck.id) {
                slot.1.extend(deck_cards);
            }
        }
        for (deck_id, deck_cards) in cards.by_deck {
            by_path
                .entry(vec![format!("Unknown deck {}", deck_id)])
                .or_default()
                .1
                .extend(deck_cards);
        }

        let entries = by_path.into_iter().map(|(path, (description, mut keyed))| {
            keyed.sort_by_key(|(key, _)| *key);
            DeckEntry {
                path,
                description,
                cards: keyed.into_iter().map(|(_, card)| card).collect(),
            }
        });
        let decks = hierarchy::build_forest(entries);

        let note_type_names = cards
            .note_type_ids
            .iter()
            .map(|id| match records.note_types.get(id) {
                Some(note_type) => note_type.name.clone(),
                None => format!("Unknown note type {}", id),
            })
            .collect();
        let schema_revision = Some(records.meta.schema_revision.clone()).filter(|r| !r.is_empty());

        let metadata = ConversionMetadata {
            converted_at: chrono::Utc::now(),
            source_format,
            total_decks: decks.iter().map(Deck::node_count).sum(),
            total_cards: cards.included,
            total_notes: cards.note_ids.len(),
            note_type_names,
            processing_time_ms: 0,
            schema_revision,
            warnings: records.anomalies.clone(),
        };
        (decks, metadata)
    }

    fn card_content(&self, note_type: &NoteType, card: &Card, fields: Vec<String>) -> CardContent {
        if note_type.is_cloze() {
            let ClozeNote {
                text_field,
                text,
                variations,
            } = cloze::parse_note(&fields, self.config.cloze_precedence);
            let extra = fields
                .get(1)
                .filter(|extra| text_field != 1 && !extra.is_empty())
                .cloned();
            return CardContent::Cloze {
                text,
                clozes: variations,
                extra,
            };
        }

        let names = note_type.field_names();
        if fields.len() == 2 {
            let question = note_type
                .template(card.template_ordinal)
                .map(|t| t.question_format.as_str())
                .unwrap_or_default();
            let mut fields = fields;
            let (front, back) = match first_referenced(question, &names) {
                Some(1) => (fields.swap_remove(1), fields.swap_remove(0)),
                _ => (fields.swap_remove(0), fields.swap_remove(0)),
            };
            return CardContent::Basic { front, back };
        }

        let width = names.len().max(fields.len());
        let mut values = fields.into_iter();
        let mut map = Map::new();
        for position in 0..width {
            let name = match names.get(position) {
                Some(name) => name.to_string(),
                None => format!("Field {}", position + 1),
            };
            let value = values.next().unwrap_or_default();
            map.insert(name, Value::String(value));
        }
        CardContent::Custom {
            note_type_name: note_type.name.clone(),
            fields: map,
        }
    }
}

/// Position in `names` of the first field a template question references
fn first_referenced(question: &str, names: &[&str]) -> Option<usize> {
    TEMPLATE_REFERENCE
        .captures_iter(question)
        .filter_map(|caps| {
            let reference = caps[1].trim().trim_start_matches(['#', '^', '/']);
            let field = reference.rsplit(':').next().unwrap_or(reference).trim();
            names.iter().position(|name| *name == field)
        })
        .next()
}
