//! Tab-separated note import
//!
//! Accepts the plain-text export written by desktop clients: one note per
//! row, fields separated by a tab, optional trailing tags column and
//! optional `#key:value` header lines.
//!
//! ```text
//! #separator:tab
//! #deck:Spanish::Verbs
//! hablar\tto speak\tverbs regular
//! comer\tto eat\tverbs regular
//! ```

use crate::error::{ParseError, ParseResult};
use crate::model::{
    split_tags, Card, DeckInfo, NormalizedRecordSet, Note, NoteType, QueueState,
};

const DEFAULT_DECK_NAME: &str = "Default";
const DEFAULT_NOTE_TYPE_NAME: &str = "Basic";
const SYNTHETIC_DECK_ID: i64 = 1;
const SYNTHETIC_NOTE_TYPE_ID: i64 = 1;

/// Header directives recognized at the top of the file
#[derive(Debug, Default)]
struct Headers {
    separator: Option<char>,
    deck: Option<String>,
    note_type: Option<String>,
    /// Zero-based column forced as tags
    tags_column: Option<usize>,
}

impl Headers {
    /// Apply `#key:value`; unknown keys are ignored
    fn apply(&mut self, line: &str, line_number: usize) -> ParseResult<()> {
        let Some((key, value)) = line.trim_start_matches('#').split_once(':') else {
            return Ok(());
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "separator" => {
                self.separator = Some(match value.to_ascii_lowercase().as_str() {
                    "tab" | "\t" => '\t',
                    "comma" | "," => ',',
                    "semicolon" | ";" => ';',
                    "pipe" | "|" => '|',
                    "space" | " " => ' ',
                    other => {
                        return Err(ParseError::new(
                            format!("unsupported separator '{}'", other),
                            Some(line_number),
                        ))
                    }
                })
            }
            "deck" if !value.is_empty() => self.deck = Some(value.to_string()),
            "notetype" if !value.is_empty() => self.note_type = Some(value.to_string()),
            "tags column" => {
                let column = value.parse::<usize>().ok().filter(|c| *c > 0).ok_or_else(|| {
                    ParseError::new(
                        format!("tags column must be a positive number, got '{}'", value),
                        Some(line_number),
                    )
                })?;
                self.tags_column = Some(column - 1);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parses tab-separated text into a single-deck record set
#[derive(Debug, Clone, Default)]
pub struct DelimitedTextParser {
    deck_name: Option<String>,
}

impl DelimitedTextParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for the synthetic deck when the text has no `#deck:` header
    pub fn with_deck_name(mut self, name: impl Into<String>) -> Self {
        self.deck_name = Some(name.into());
        self
    }

    pub fn parse(&self, text: &str) -> ParseResult<NormalizedRecordSet> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut headers = Headers::default();

        let mut header_end = 0;
        let mut line_number = 0;
        for line in text.split_inclusive('\n') {
            if !line.starts_with('#') {
                break;
            }
            line_number += 1;
            headers.apply(line.trim_end_matches(['\r', '\n']), line_number)?;
            header_end += line.len();
        }

        let separator = headers.separator.unwrap_or('\t');
        let rows: Vec<Vec<String>> = split_rows(&text[header_end..], separator)
            .into_iter()
            .filter(|row| row.iter().any(|field| !field.trim().is_empty()))
            .collect();

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let tags_column = headers
            .tags_column
            .filter(|column| *column < width)
            .or_else(|| detect_tags_column(&rows));
        let field_count = match tags_column {
            Some(_) => width.saturating_sub(1).max(1),
            None => width.max(1),
        };

        let mut records = NormalizedRecordSet::default();

        let deck_name = headers
            .deck
            .or_else(|| self.deck_name.clone())
            .unwrap_or_else(|| DEFAULT_DECK_NAME.to_string());
        records
            .decks
            .insert(SYNTHETIC_DECK_ID, DeckInfo::new(SYNTHETIC_DECK_ID, deck_name));

        let field_names: Vec<String> = (0..field_count)
            .map(|index| match index {
                0 => "Front".to_string(),
                1 => "Back".to_string(),
                n => format!("Field {}", n + 1),
            })
            .collect();
        let note_type_name = headers
            .note_type
            .unwrap_or_else(|| DEFAULT_NOTE_TYPE_NAME.to_string());
        records.note_types.insert(
            SYNTHETIC_NOTE_TYPE_ID,
            NoteType::with_field_names(SYNTHETIC_NOTE_TYPE_ID, note_type_name, &field_names),
        );

        for (index, mut row) in rows.into_iter().enumerate() {
            let id = index as i64 + 1;
            row.resize(width, String::new());
            let tags = match tags_column {
                Some(column) => split_tags(&row.remove(column)),
                None => Vec::new(),
            };
            row.resize(field_count, String::new());

            records.notes.push(Note {
                id,
                guid: format!("row-{}", id),
                note_type_id: SYNTHETIC_NOTE_TYPE_ID,
                fields: row,
                tags,
                modified_at: 0,
            });
            records.cards.push(Card {
                id,
                note_id: id,
                deck_id: SYNTHETIC_DECK_ID,
                template_ordinal: 0,
                queue_state: QueueState::New,
                due: 0,
                interval: 0,
                ease_factor: 0.0,
                repetitions: 0,
                lapses: 0,
            });
        }

        tracing::debug!(
            "parsed {} delimited rows with {} fields{}",
            records.notes.len(),
            field_count,
            if tags_column.is_some() { " and tags" } else { "" }
        );
        Ok(records)
    }
}

/// Split into rows of unescaped fields; escaped newlines stay inside a field
fn split_rows(text: &str, separator: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('t') => {
                    chars.next();
                    field.push('\t');
                }
                Some('n') => {
                    chars.next();
                    field.push('\n');
                }
                Some('\\') => {
                    chars.next();
                    field.push('\\');
                }
                _ => field.push('\\'),
            },
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c if c == separator => row.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn is_tag_token(token: &str) -> bool {
    !token.contains(['<', '>', '"', '{', '}'])
}

/// Last column is tags when every row has the same width of at least
/// three and every last value is empty or a list of tag-like tokens
fn detect_tags_column(rows: &[Vec<String>]) -> Option<usize> {
    let width = rows.first()?.len();
    if width < 3 || rows.iter().any(|row| row.len() != width) {
        return None;
    }
    let last = width - 1;
    rows.iter()
        .all(|row| row[last].split_whitespace().all(is_tag_token))
        .then_some(last)
}
