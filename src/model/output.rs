//! Output document shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::records::QueueState;
use crate::parser::detect::SourceFormat;

/// One node of the deck forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// This node's own path segment
    pub name: String,
    pub description: String,
    pub cards: Vec<OutputCard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdecks: Vec<Deck>,
}

impl Deck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cards: Vec::new(),
            subdecks: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.subdecks.iter().map(Deck::node_count).sum::<usize>()
    }

    /// Number of output cards in this subtree
    pub fn card_count(&self) -> usize {
        self.cards.len() + self.subdecks.iter().map(Deck::card_count).sum::<usize>()
    }

    pub fn subdeck(&self, name: &str) -> Option<&Deck> {
        self.subdecks.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClozeVariation {
    pub index: u32,
    pub masked_text: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Type-specific card payload, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CardContent {
    Basic {
        front: String,
        back: String,
    },
    Cloze {
        text: String,
        clozes: Vec<ClozeVariation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<String>,
    },
    Custom {
        note_type_name: String,
        fields: serde_json::Map<String, serde_json::Value>,
    },
}

impl CardContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            CardContent::Basic { .. } => "basic",
            CardContent::Cloze { .. } => "cloze",
            CardContent::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardStats {
    pub queue: QueueState,
    pub due: i64,
    pub interval: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    pub lapses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputCard {
    pub id: i64,
    #[serde(flatten)]
    pub content: CardContent,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<CardStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    pub converted_at: chrono::DateTime<chrono::Utc>,
    pub source_format: SourceFormat,
    pub total_decks: usize,
    pub total_cards: usize,
    pub total_notes: usize,
    pub note_type_names: BTreeSet<String>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Top-level JSON document: `{ "decks": [...], "metadata": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub decks: Vec<Deck>,
    pub metadata: ConversionMetadata,
}

impl ConversionOutput {
    /// Find a node by its full `::`-joined path
    pub fn find_deck(&self, path: &str) -> Option<&Deck> {
        let mut segments = path.split(super::records::DECK_SEPARATOR);
        let first = segments.next()?;
        let mut node = self.decks.iter().find(|d| d.name == first)?;
        for segment in segments {
            node = node.subdeck(segment)?;
        }
        Some(node)
    }
}
