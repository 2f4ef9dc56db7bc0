//! Deck forest assembly from `::`-separated names

use crate::model::{Deck, OutputCard, DECK_SEPARATOR};

/// Name used when a stored deck name has no usable segment
pub const FALLBACK_DECK_NAME: &str = "Default";

/// A leaf to place in the forest, keyed by its full path
#[derive(Debug, Clone)]
pub struct DeckEntry {
    pub path: Vec<String>,
    pub description: String,
    pub cards: Vec<OutputCard>,
}

/// Trimmed, non-empty path segments of a stored deck name
pub fn split_deck_name(name: &str) -> Vec<String> {
    let segments: Vec<String> = name
        .split(DECK_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if segments.is_empty() {
        vec![FALLBACK_DECK_NAME.to_string()]
    } else {
        segments
    }
}

/// Build a root-less forest. Intermediate nodes are created empty and
/// cards attach only to the node at the full path; siblings are sorted by
/// name while card order within a node is kept.
pub fn build_forest<I>(entries: I) -> Vec<Deck>
where
    I: IntoIterator<Item = DeckEntry>,
{
    let mut roots: Vec<Deck> = Vec::new();
    for entry in entries {
        let node = node_mut(&mut roots, &entry.path);
        if node.description.is_empty() {
            node.description = entry.description;
        }
        node.cards.extend(entry.cards);
    }
    sort_siblings(&mut roots);
    roots
}

fn node_mut<'a>(siblings: &'a mut Vec<Deck>, path: &[String]) -> &'a mut Deck {
    let Some((first, rest)) = path.split_first() else {
        return node_mut(siblings, &[FALLBACK_DECK_NAME.to_string()]);
    };
    let position = match siblings.iter().position(|deck| deck.name == *first) {
        Some(position) => position,
        None => {
            siblings.push(Deck::new(first.clone()));
            siblings.len() - 1
        }
    };
    let node = &mut siblings[position];
    if rest.is_empty() {
        node
    } else {
        node_mut(&mut node.subdecks, rest)
    }
}

fn sort_siblings(decks: &mut [Deck]) {
    decks.sort_by(|a, b| a.name.cmp(&b.name));
    for deck in decks {
        sort_siblings(&mut deck.subdecks);
    }
}
