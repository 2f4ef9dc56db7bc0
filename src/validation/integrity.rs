//! Referential repair of freshly read record sets
//!
//! Readers hand over rows as stored. Before the set is frozen every card must
//! point at a note and a deck, and every note at a note-type. Anything that
//! does not is repaired with a placeholder or dropped, and the downgrade is
//! recorded as an anomaly instead of failing the job.

use std::collections::{BTreeMap, HashSet};

use crate::model::{DeckInfo, NormalizedRecordSet, NoteType};

/// Summary of what `repair` changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub orphan_cards_dropped: usize,
    pub placeholder_decks: usize,
    pub placeholder_note_types: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == RepairReport::default()
    }
}

pub fn repair(records: &mut NormalizedRecordSet) -> RepairReport {
    let mut report = RepairReport::default();

    // notes -> note-types
    let mut missing_types: BTreeMap<i64, usize> = BTreeMap::new();
    for note in &records.notes {
        if !records.note_types.contains_key(&note.note_type_id) {
            let width = missing_types.entry(note.note_type_id).or_insert(0);
            *width = (*width).max(note.fields.len());
        }
    }
    for (id, width) in missing_types {
        records.record_anomaly(format!(
            "note type {} is referenced but not defined; using placeholder",
            id
        ));
        records.note_types.insert(id, NoteType::placeholder(id, width));
        report.placeholder_note_types += 1;
    }

    // cards -> notes
    let note_ids: HashSet<i64> = records.notes.iter().map(|n| n.id).collect();
    let before = records.cards.len();
    let mut dropped = Vec::new();
    records.cards.retain(|card| {
        let keep = note_ids.contains(&card.note_id);
        if !keep {
            dropped.push((card.id, card.note_id));
        }
        keep
    });
    report.orphan_cards_dropped = before - records.cards.len();
    for (card_id, note_id) in dropped {
        records.record_anomaly(format!(
            "card {} references missing note {}; card skipped",
            card_id, note_id
        ));
    }

    // cards -> decks
    let mut missing_decks: Vec<i64> = records
        .cards
        .iter()
        .map(|c| c.deck_id)
        .filter(|id| !records.decks.contains_key(id))
        .collect();
    missing_decks.sort_unstable();
    missing_decks.dedup();
    for id in missing_decks {
        records.record_anomaly(format!(
            "deck {} is referenced but not defined; using placeholder",
            id
        ));
        records
            .decks
            .insert(id, DeckInfo::new(id, format!("Unknown deck {}", id)));
        report.placeholder_decks += 1;
    }

    report
}
