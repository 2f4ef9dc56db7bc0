//! Normalized records shared by every source reader

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator used in normalized deck names
pub const DECK_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub guid: String,
    pub note_type_id: i64,
    /// Raw field text in note-type field order
    pub fields: Vec<String>,
    /// Unique tags in source order
    pub tags: Vec<String>,
    pub modified_at: i64,
}

/// Scheduling queue a card sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    New,
    Learning,
    Review,
    Suspended,
}

impl QueueState {
    /// Map the `queue` column, falling back to `type` for buried cards
    pub fn from_columns(queue: i64, card_type: i64) -> Self {
        match queue {
            -1 => QueueState::Suspended,
            0 => QueueState::New,
            1 | 3 | 4 => QueueState::Learning,
            2 => QueueState::Review,
            _ => match card_type {
                1 | 3 => QueueState::Learning,
                2 => QueueState::Review,
                _ => QueueState::New,
            },
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, QueueState::Suspended)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub template_ordinal: u32,
    pub queue_state: QueueState,
    pub due: i64,
    /// Days (negative values are seconds while learning)
    pub interval: i64,
    /// Ratio, e.g. 2.5
    pub ease_factor: f64,
    pub repetitions: i64,
    pub lapses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub config_id: i64,
}

impl DeckInfo {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            config_id: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteTypeKind {
    Standard,
    Cloze,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ordinal: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    pub ordinal: u32,
    pub question_format: String,
    pub answer_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteType {
    pub id: i64,
    pub name: String,
    pub kind: NoteTypeKind,
    pub fields: Vec<FieldDef>,
    pub templates: Vec<TemplateDef>,
}

impl NoteType {
    /// Standard note-type whose fields are named by `names` in order
    pub fn with_field_names<S: AsRef<str>>(id: i64, name: impl Into<String>, names: &[S]) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NoteTypeKind::Standard,
            fields: names
                .iter()
                .enumerate()
                .map(|(ordinal, field)| FieldDef {
                    name: field.as_ref().to_string(),
                    ordinal: ordinal as u32,
                    flags: 0,
                })
                .collect(),
            templates: Vec::new(),
        }
    }

    /// Placeholder for a note-type the collection references but never defines
    pub fn placeholder(id: i64, field_count: usize) -> Self {
        let names: Vec<String> = (1..=field_count.max(1))
            .map(|n| format!("Field {}", n))
            .collect();
        Self::with_field_names(id, format!("Unknown note type {}", id), &names)
    }

    pub fn is_cloze(&self) -> bool {
        self.kind == NoteTypeKind::Cloze
    }

    pub fn template(&self, ordinal: u32) -> Option<&TemplateDef> {
        self.templates.iter().find(|t| t.ordinal == ordinal)
    }

    /// Field names in ordinal order
    pub fn field_names(&self) -> Vec<&str> {
        let mut fields: Vec<&FieldDef> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.ordinal);
        fields.into_iter().map(|f| f.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub created_at: i64,
    pub modified_at: i64,
    /// Schema revision label, e.g. `legacy` or `decomposed`
    pub schema_revision: String,
    /// Collection `ver` column
    pub format_version: i64,
}

/// Everything read from one source, fully populated before text extraction
#[derive(Debug, Clone, Default)]
pub struct NormalizedRecordSet {
    pub notes: Vec<Note>,
    pub cards: Vec<Card>,
    pub decks: BTreeMap<i64, DeckInfo>,
    pub note_types: BTreeMap<i64, NoteType>,
    pub meta: CollectionMeta,
    /// Record-level downgrades applied while reading
    pub anomalies: Vec<String>,
}

impl NormalizedRecordSet {
    pub fn record_anomaly(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.anomalies.push(message);
    }
}

/// Split a raw tag string on whitespace, dropping duplicates but keeping order
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split_whitespace() {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
