//! Record and document types
//!
//! `records` holds the normalized intermediate form every reader produces;
//! `output` holds the JSON document the builder assembles from it.

pub mod output;
pub mod records;

pub use output::{
    CardContent, CardStats, ClozeVariation, ConversionMetadata, ConversionOutput, Deck,
    OutputCard,
};
pub use records::{
    split_tags, Card, CollectionMeta, DeckInfo, FieldDef, NormalizedRecordSet, Note, NoteType,
    NoteTypeKind, QueueState, TemplateDef, DECK_SEPARATOR,
};
