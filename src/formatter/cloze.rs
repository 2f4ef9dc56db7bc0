//! Cloze deletion markers
//!
//! Grammar: `{{cN::answer}}` or `{{cN::answer::hint}}` with `N >= 1`.
//! Each distinct index becomes one variation in which the markers of that
//! index are masked and every other marker is left verbatim.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::conversion::ClozePrecedence;
use crate::model::ClozeVariation;

static CLOZE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{c([1-9][0-9]{0,5})::(.*?)(?:::(.*?))?\}\}").expect("valid cloze pattern")
});

const MASK: &str = "[...]";

/// One marker occurrence inside a field
#[derive(Debug, Clone, PartialEq)]
pub struct ClozeMarker<'a> {
    pub start: usize,
    pub end: usize,
    pub index: u32,
    pub answer: &'a str,
    pub hint: Option<&'a str>,
}

impl ClozeMarker<'_> {
    fn placeholder(&self) -> String {
        match self.hint {
            Some(hint) => format!("[{}]", hint),
            None => MASK.to_string(),
        }
    }
}

/// Markers in order of appearance
pub fn markers(text: &str) -> Vec<ClozeMarker<'_>> {
    CLOZE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ClozeMarker {
                start: whole.start(),
                end: whole.end(),
                index: caps[1].parse().ok()?,
                answer: caps.get(2)?.as_str(),
                hint: caps.get(3).map(|m| m.as_str()).filter(|h| !h.is_empty()),
            })
        })
        .collect()
}

pub fn has_markers(text: &str) -> bool {
    CLOZE_MARKER.is_match(text)
}

/// Distinct indices across all fields, ascending
pub fn indices(fields: &[String]) -> BTreeSet<u32> {
    fields
        .iter()
        .flat_map(|field| markers(field))
        .map(|marker| marker.index)
        .collect()
}

/// Replace the markers of `index` in `text` with their placeholder
pub fn mask(text: &str, index: u32) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut cursor = 0;
    for marker in markers(text).into_iter().filter(|m| m.index == index) {
        masked.push_str(&text[cursor..marker.start]);
        masked.push_str(&marker.placeholder());
        cursor = marker.end;
    }
    masked.push_str(&text[cursor..]);
    masked
}

/// Cloze body of a note after parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ClozeNote {
    /// Position of the field that carries the masked text
    pub text_field: usize,
    pub text: String,
    pub variations: Vec<ClozeVariation>,
}

/// Build one variation per distinct index found in `fields`.
///
/// The first field containing a marker is the one masked. When an index
/// occurs more than once, `precedence` picks which occurrence supplies the
/// answer and hint.
pub fn parse_note(fields: &[String], precedence: ClozePrecedence) -> ClozeNote {
    let text_field = fields.iter().position(|f| has_markers(f)).unwrap_or(0);
    let text = fields.get(text_field).cloned().unwrap_or_default();

    let all_markers: Vec<ClozeMarker<'_>> = fields.iter().flat_map(|f| markers(f)).collect();
    let variations = indices(fields)
        .into_iter()
        .filter_map(|index| {
            let mut occurrences = all_markers.iter().filter(|m| m.index == index);
            let chosen = match precedence {
                ClozePrecedence::FirstSeen => occurrences.next(),
                ClozePrecedence::LastSeen => occurrences.last(),
            }?;
            Some(ClozeVariation {
                index,
                masked_text: mask(&text, index),
                answer: chosen.answer.to_string(),
                hint: chosen.hint.map(str::to_string),
            })
        })
        .collect();

    ClozeNote {
        text_field,
        text,
        variations,
    }
}
