//! Read-only extraction of notes, cards, decks and note-types from a
//! collection database.
//!
//! Two schema revisions are understood:
//!
//! * **decomposed** (collection versions 15-18): note-types, fields,
//!   templates and decks live in their own tables; settings are serialized
//!   into blob columns and deck names use `\x1f` as separator.
//! * **legacy** (collection version 11): a single `col` row carries
//!   JSON blobs for every model and deck.
//!
//! Revision handling is a table of strategies tried newest first, so a new
//! revision is one more entry rather than another branch in every reader.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use serde::Deserialize;
use serde_json::Value;

use crate::conversion::config::ConversionConfig;
use crate::conversion::progress::CancellationToken;
use crate::error::{ConversionError, ConversionErrorKind, ConversionResult};
use crate::model::{
    split_tags, Card, CollectionMeta, DeckInfo, FieldDef, NormalizedRecordSet, Note, NoteType,
    NoteTypeKind, QueueState, TemplateDef, DECK_SEPARATOR,
};
use crate::parser::proto;
use crate::validation;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const FIELD_SEPARATOR: char = '\x1f';
const NEWEST_KNOWN_VERSION: i64 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaRevision {
    Decomposed,
    Legacy,
}

impl SchemaRevision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaRevision::Decomposed => "decomposed",
            SchemaRevision::Legacy => "legacy",
        }
    }
}

type Reader = fn(&Connection, &TableCatalog, &mut NormalizedRecordSet) -> ConversionResult<()>;

/// How to recognize and read one schema revision
struct RevisionStrategy {
    revision: SchemaRevision,
    matches: fn(&TableCatalog) -> bool,
    read_decks: Reader,
    read_note_types: Reader,
}

static STRATEGIES: [RevisionStrategy; 2] = [
    RevisionStrategy {
        revision: SchemaRevision::Decomposed,
        matches: is_decomposed,
        read_decks: read_decks_decomposed,
        read_note_types: read_note_types_decomposed,
    },
    RevisionStrategy {
        revision: SchemaRevision::Legacy,
        matches: is_legacy,
        read_decks: read_decks_legacy,
        read_note_types: read_note_types_legacy,
    },
];

fn is_decomposed(catalog: &TableCatalog) -> bool {
    ["notetypes", "fields", "templates", "decks"]
        .into_iter()
        .all(|table| catalog.has_table(table))
}

fn is_legacy(catalog: &TableCatalog) -> bool {
    catalog.has_column("col", "models") && catalog.has_column("col", "decks")
}

/// Tables and their columns, as reported by the database itself
#[derive(Debug, Default)]
pub struct TableCatalog {
    tables: HashMap<String, HashSet<String>>,
}

impl TableCatalog {
    fn load(conn: &Connection) -> ConversionResult<Self> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .map_err(db_error("list tables"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error("list tables"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error("list tables"))?;

        let mut tables = HashMap::new();
        for name in names {
            let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
            let mut stmt = conn.prepare(&pragma).map_err(db_error("inspect table"))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .map_err(db_error("inspect table"))?
                .collect::<Result<HashSet<_>, _>>()
                .map_err(db_error("inspect table"))?;
            tables.insert(name.to_ascii_lowercase(), columns);
        }
        Ok(Self { tables })
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// `column`, or `default AS column` when this revision lacks it
    fn column_or(&self, table: &str, column: &str, default: &str) -> String {
        if self.has_column(table, column) {
            column.to_string()
        } else {
            format!("{} AS {}", default, column)
        }
    }
}

/// Reads collection databases into a [`NormalizedRecordSet`]
pub struct SchemaReader<'a> {
    config: &'a ConversionConfig,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> SchemaReader<'a> {
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn read(&self, database: &[u8]) -> ConversionResult<NormalizedRecordSet> {
        if !database.starts_with(SQLITE_HEADER) {
            return Err(ConversionError::corrupted(
                "embedded collection is not a SQLite database",
            ));
        }

        // SQLite needs a file; the private copy is the only thing ever opened
        let file = materialize(database)?;
        let conn = Connection::open_with_flags(
            file.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_error("open collection"))?;

        let catalog = TableCatalog::load(&conn)?;
        if !catalog.has_table("notes") || !catalog.has_table("cards") {
            return Err(ConversionError::unsupported_version(
                "database has no notes/cards tables",
            ));
        }
        let strategy = STRATEGIES
            .iter()
            .find(|s| (s.matches)(&catalog))
            .ok_or_else(|| {
                ConversionError::unsupported_version(
                    "schema matches no known collection revision",
                )
            })?;
        tracing::debug!("detected {} schema", strategy.revision.as_str());

        let mut records = NormalizedRecordSet {
            meta: read_meta(&conn, &catalog, strategy.revision)?,
            ..Default::default()
        };
        if records.meta.format_version > NEWEST_KNOWN_VERSION {
            records.record_anomaly(format!(
                "collection version {} is newer than {}; reading as {}",
                records.meta.format_version,
                NEWEST_KNOWN_VERSION,
                strategy.revision.as_str()
            ));
        }

        self.read_notes(&conn, &catalog, &mut records)?;
        self.read_cards(&conn, &catalog, &mut records)?;
        (strategy.read_decks)(&conn, &catalog, &mut records)?;
        (strategy.read_note_types)(&conn, &catalog, &mut records)?;

        validation::repair(&mut records);
        tracing::debug!(
            "read {} notes, {} cards, {} decks, {} note types",
            records.notes.len(),
            records.cards.len(),
            records.decks.len(),
            records.note_types.len()
        );
        Ok(records)
    }

    fn tick(&self, count: usize) -> ConversionResult<()> {
        if count % self.config.cancel_check_interval == 0 {
            if let Some(token) = self.cancel {
                token.check()?;
            }
        }
        Ok(())
    }

    fn read_notes(
        &self,
        conn: &Connection,
        catalog: &TableCatalog,
        records: &mut NormalizedRecordSet,
    ) -> ConversionResult<()> {
        let sql = format!(
            "SELECT id, {}, mid, {}, {}, flds FROM notes ORDER BY id",
            catalog.column_or("notes", "guid", "''"),
            catalog.column_or("notes", "mod", "0"),
            catalog.column_or("notes", "tags", "''"),
        );
        let mut stmt = conn.prepare(&sql).map_err(db_error("read notes"))?;
        let mut rows = stmt.query([]).map_err(db_error("read notes"))?;
        while let Some(row) = rows.next().map_err(db_error("read notes"))? {
            self.tick(records.notes.len())?;
            records.notes.push(Note {
                id: int_at(row, 0),
                guid: text_at(row, 1),
                note_type_id: int_at(row, 2),
                modified_at: int_at(row, 3),
                tags: split_tags(&text_at(row, 4)),
                fields: text_at(row, 5)
                    .split(FIELD_SEPARATOR)
                    .map(str::to_string)
                    .collect(),
            });
        }
        Ok(())
    }

    fn read_cards(
        &self,
        conn: &Connection,
        catalog: &TableCatalog,
        records: &mut NormalizedRecordSet,
    ) -> ConversionResult<()> {
        let sql = format!(
            "SELECT id, nid, did, {}, {}, {}, {}, {}, {}, {}, {}, {} FROM cards ORDER BY id",
            catalog.column_or("cards", "ord", "0"),
            catalog.column_or("cards", "queue", "0"),
            catalog.column_or("cards", "type", "0"),
            catalog.column_or("cards", "due", "0"),
            catalog.column_or("cards", "ivl", "0"),
            catalog.column_or("cards", "factor", "0"),
            catalog.column_or("cards", "reps", "0"),
            catalog.column_or("cards", "lapses", "0"),
            catalog.column_or("cards", "odid", "0"),
        );
        let mut stmt = conn.prepare(&sql).map_err(db_error("read cards"))?;
        let mut rows = stmt.query([]).map_err(db_error("read cards"))?;
        while let Some(row) = rows.next().map_err(db_error("read cards"))? {
            self.tick(records.cards.len())?;
            let original_deck = int_at(row, 11);
            records.cards.push(Card {
                id: int_at(row, 0),
                note_id: int_at(row, 1),
                // cards in filtered decks belong to their home deck
                deck_id: if original_deck != 0 {
                    original_deck
                } else {
                    int_at(row, 2)
                },
                template_ordinal: u32::try_from(int_at(row, 3)).unwrap_or(0),
                queue_state: QueueState::from_columns(int_at(row, 4), int_at(row, 5)),
                due: int_at(row, 6),
                interval: int_at(row, 7),
                ease_factor: int_at(row, 8) as f64 / 1000.0,
                repetitions: int_at(row, 9),
                lapses: int_at(row, 10),
            });
        }
        Ok(())
    }
}

/// Copy the database into a private temporary file.
///
/// WAL-mode databases cannot be opened read-only without their side files,
/// so the copy's header is switched back to rollback-journal mode.
fn materialize(database: &[u8]) -> ConversionResult<tempfile::NamedTempFile> {
    let io_error = |e: std::io::Error| {
        ConversionError::with_source(
            ConversionErrorKind::unknown(format!("cannot stage database: {}", e)),
            e,
        )
    };
    let mut file = tempfile::NamedTempFile::new().map_err(io_error)?;
    if database.len() > 19 && (database[18] == 2 || database[19] == 2) {
        let mut patched = database.to_vec();
        patched[18] = 1;
        patched[19] = 1;
        file.write_all(&patched).map_err(io_error)?;
    } else {
        file.write_all(database).map_err(io_error)?;
    }
    file.flush().map_err(io_error)?;
    Ok(file)
}

fn read_meta(
    conn: &Connection,
    catalog: &TableCatalog,
    revision: SchemaRevision,
) -> ConversionResult<CollectionMeta> {
    let mut meta = CollectionMeta {
        schema_revision: revision.as_str().to_string(),
        ..Default::default()
    };
    if !catalog.has_table("col") {
        return Ok(meta);
    }
    let sql = format!(
        "SELECT {}, {}, {} FROM col LIMIT 1",
        catalog.column_or("col", "crt", "0"),
        catalog.column_or("col", "mod", "0"),
        catalog.column_or("col", "ver", "0"),
    );
    let mut stmt = conn.prepare(&sql).map_err(db_error("read collection"))?;
    let mut rows = stmt.query([]).map_err(db_error("read collection"))?;
    if let Some(row) = rows.next().map_err(db_error("read collection"))? {
        meta.created_at = int_at(row, 0);
        meta.modified_at = int_at(row, 1);
        meta.format_version = int_at(row, 2);
    }
    Ok(meta)
}

/// Single `col` blob column as text, empty when absent
fn col_blob(conn: &Connection, column: &str) -> ConversionResult<String> {
    let sql = format!("SELECT {} FROM col LIMIT 1", column);
    let mut stmt = conn.prepare(&sql).map_err(db_error("read collection"))?;
    let mut rows = stmt.query([]).map_err(db_error("read collection"))?;
    Ok(match rows.next().map_err(db_error("read collection"))? {
        Some(row) => text_at(row, 0),
        None => String::new(),
    })
}

/// Parse a `{"<id>": {...}, ...}` blob, recording an anomaly when unreadable
fn parse_id_map(
    blob: &str,
    what: &str,
    records: &mut NormalizedRecordSet,
) -> Vec<(i64, Value)> {
    if blob.trim().is_empty() {
        return Vec::new();
    }
    let map: serde_json::Map<String, Value> = match serde_json::from_str(blob) {
        Ok(map) => map,
        Err(e) => {
            records.record_anomaly(format!("{} definitions are unreadable ({}); none loaded", what, e));
            return Vec::new();
        }
    };

    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        let id = key
            .parse::<i64>()
            .ok()
            .or_else(|| value.get("id").and_then(Value::as_i64));
        match id {
            Some(id) => entries.push((id, value)),
            None => records.record_anomaly(format!("{} entry '{}' has no usable id; skipped", what, key)),
        }
    }
    entries
}

#[derive(Deserialize)]
struct LegacyDeck {
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    conf: Option<i64>,
}

fn read_decks_legacy(
    conn: &Connection,
    _catalog: &TableCatalog,
    records: &mut NormalizedRecordSet,
) -> ConversionResult<()> {
    let blob = col_blob(conn, "decks")?;
    for (id, value) in parse_id_map(&blob, "deck", records) {
        let deck = match serde_json::from_value::<LegacyDeck>(value) {
            Ok(deck) => DeckInfo {
                id,
                name: deck.name,
                description: deck.desc,
                config_id: deck.conf.unwrap_or(1),
            },
            Err(e) => {
                records.record_anomaly(format!("deck {} is malformed ({}); using defaults", id, e));
                DeckInfo::new(id, format!("Deck {}", id))
            }
        };
        records.decks.insert(id, deck);
    }
    Ok(())
}

#[derive(Deserialize)]
struct LegacyModel {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: i64,
    #[serde(default)]
    flds: Vec<LegacyField>,
    #[serde(default)]
    tmpls: Vec<LegacyTemplate>,
}

#[derive(Deserialize)]
struct LegacyField {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ord: Option<u32>,
    #[serde(default)]
    sticky: bool,
    #[serde(default)]
    rtl: bool,
}

#[derive(Deserialize)]
struct LegacyTemplate {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ord: Option<u32>,
    #[serde(default)]
    qfmt: String,
    #[serde(default)]
    afmt: String,
}

fn field_flags(sticky: bool, rtl: bool) -> u32 {
    u32::from(sticky) | (u32::from(rtl) << 1)
}

fn read_note_types_legacy(
    conn: &Connection,
    _catalog: &TableCatalog,
    records: &mut NormalizedRecordSet,
) -> ConversionResult<()> {
    let blob = col_blob(conn, "models")?;
    for (id, value) in parse_id_map(&blob, "note type", records) {
        let model = match serde_json::from_value::<LegacyModel>(value) {
            Ok(model) => model,
            Err(e) => {
                // fields are sized later from the notes that use it
                records.record_anomaly(format!(
                    "note type {} is malformed ({}); using placeholder",
                    id, e
                ));
                continue;
            }
        };
        let note_type = NoteType {
            id,
            name: model.name,
            kind: if model.kind == 1 {
                NoteTypeKind::Cloze
            } else {
                NoteTypeKind::Standard
            },
            fields: model
                .flds
                .into_iter()
                .enumerate()
                .map(|(index, f)| FieldDef {
                    name: f.name,
                    ordinal: f.ord.unwrap_or(index as u32),
                    flags: field_flags(f.sticky, f.rtl),
                })
                .collect(),
            templates: model
                .tmpls
                .into_iter()
                .enumerate()
                .map(|(index, t)| TemplateDef {
                    name: t.name,
                    ordinal: t.ord.unwrap_or(index as u32),
                    question_format: t.qfmt,
                    answer_format: t.afmt,
                })
                .collect(),
        };
        records.note_types.insert(id, note_type);
    }
    Ok(())
}

/// Blob column decoded as JSON when it looks like JSON
fn json_blob(bytes: &[u8]) -> Option<Value> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace())?;
    if *first != b'{' {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn read_decks_decomposed(
    conn: &Connection,
    catalog: &TableCatalog,
    records: &mut NormalizedRecordSet,
) -> ConversionResult<()> {
    let sql = format!(
        "SELECT id, name, {} FROM decks ORDER BY id",
        catalog.column_or("decks", "kind", "NULL"),
    );
    let mut stmt = conn.prepare(&sql).map_err(db_error("read decks"))?;
    let mut rows = stmt.query([]).map_err(db_error("read decks"))?;
    while let Some(row) = rows.next().map_err(db_error("read decks"))? {
        let id = int_at(row, 0);
        let name = text_at(row, 1).replace(FIELD_SEPARATOR, DECK_SEPARATOR);
        let kind = blob_at(row, 2);

        let mut deck = DeckInfo::new(id, name);
        if let Some(json) = json_blob(&kind) {
            deck.description = json
                .get("desc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            deck.config_id = json.get("conf").and_then(Value::as_i64).unwrap_or(1);
        } else if let Some(normal) = proto::bytes_field(&kind, 1) {
            deck.description = proto::string_field(normal, 4).unwrap_or_default();
            deck.config_id = proto::varint_field(normal, 1)
                .and_then(|v| i64::try_from(v).ok())
                .unwrap_or(1);
        } else if proto::bytes_field(&kind, 2).is_some() {
            // filtered deck: no home config
            deck.config_id = 0;
        }
        records.decks.insert(id, deck);
    }
    Ok(())
}

fn read_note_types_decomposed(
    conn: &Connection,
    catalog: &TableCatalog,
    records: &mut NormalizedRecordSet,
) -> ConversionResult<()> {
    let mut note_types: BTreeMap<i64, NoteType> = BTreeMap::new();

    let sql = format!(
        "SELECT id, name, {} FROM notetypes ORDER BY id",
        catalog.column_or("notetypes", "config", "NULL"),
    );
    let mut stmt = conn.prepare(&sql).map_err(db_error("read note types"))?;
    let mut rows = stmt.query([]).map_err(db_error("read note types"))?;
    while let Some(row) = rows.next().map_err(db_error("read note types"))? {
        let id = int_at(row, 0);
        let config = blob_at(row, 2);
        let kind_value = match json_blob(&config) {
            Some(json) => json
                .get("kind")
                .or_else(|| json.get("type"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            None => proto::varint_field(&config, 1).unwrap_or(0),
        };
        let mut note_type = NoteType::with_field_names::<&str>(id, text_at(row, 1), &[]);
        if kind_value == 1 {
            note_type.kind = NoteTypeKind::Cloze;
        }
        note_types.insert(id, note_type);
    }

    let sql = format!(
        "SELECT ntid, ord, name, {} FROM fields ORDER BY ntid, ord",
        catalog.column_or("fields", "config", "NULL"),
    );
    let mut stmt = conn.prepare(&sql).map_err(db_error("read fields"))?;
    let mut rows = stmt.query([]).map_err(db_error("read fields"))?;
    while let Some(row) = rows.next().map_err(db_error("read fields"))? {
        let note_type_id = int_at(row, 0);
        let config = blob_at(row, 3);
        let (sticky, rtl) = match json_blob(&config) {
            Some(json) => (
                json.get("sticky").and_then(Value::as_bool).unwrap_or(false),
                json.get("rtl").and_then(Value::as_bool).unwrap_or(false),
            ),
            None => (
                proto::varint_field(&config, 1).unwrap_or(0) != 0,
                proto::varint_field(&config, 2).unwrap_or(0) != 0,
            ),
        };
        match note_types.get_mut(&note_type_id) {
            Some(note_type) => note_type.fields.push(FieldDef {
                name: text_at(row, 2),
                ordinal: u32::try_from(int_at(row, 1)).unwrap_or(0),
                flags: field_flags(sticky, rtl),
            }),
            None => records.record_anomaly(format!(
                "field '{}' belongs to unknown note type {}; ignored",
                text_at(row, 2),
                note_type_id
            )),
        }
    }

    let sql = format!(
        "SELECT ntid, ord, name, {} FROM templates ORDER BY ntid, ord",
        catalog.column_or("templates", "config", "NULL"),
    );
    let mut stmt = conn.prepare(&sql).map_err(db_error("read templates"))?;
    let mut rows = stmt.query([]).map_err(db_error("read templates"))?;
    while let Some(row) = rows.next().map_err(db_error("read templates"))? {
        let note_type_id = int_at(row, 0);
        let config = blob_at(row, 3);
        let (question_format, answer_format) = match json_blob(&config) {
            Some(json) => (
                json.get("qfmt").and_then(Value::as_str).unwrap_or_default().to_string(),
                json.get("afmt").and_then(Value::as_str).unwrap_or_default().to_string(),
            ),
            None => (
                proto::string_field(&config, 1).unwrap_or_default(),
                proto::string_field(&config, 2).unwrap_or_default(),
            ),
        };
        if let Some(note_type) = note_types.get_mut(&note_type_id) {
            note_type.templates.push(TemplateDef {
                name: text_at(row, 2),
                ordinal: u32::try_from(int_at(row, 1)).unwrap_or(0),
                question_format,
                answer_format,
            });
        }
    }

    records.note_types.extend(note_types);
    Ok(())
}

fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> ConversionError {
    move |e| {
        ConversionError::with_source(
            ConversionErrorKind::corrupted(format!("cannot {}: {}", context, e)),
            e,
        )
    }
}

/// Integer column, tolerant of the loose typing SQLite allows
fn int_at(row: &Row<'_>, index: usize) -> i64 {
    match row.get_ref(index) {
        Ok(ValueRef::Integer(v)) => v,
        Ok(ValueRef::Real(v)) => v as i64,
        Ok(ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

/// Text column; blobs are decoded lossily and NULL becomes empty
fn text_at(row: &Row<'_>, index: usize) -> String {
    match row.get_ref(index) {
        Ok(ValueRef::Text(bytes)) | Ok(ValueRef::Blob(bytes)) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        Ok(ValueRef::Integer(v)) => v.to_string(),
        Ok(ValueRef::Real(v)) => v.to_string(),
        _ => String::new(),
    }
}

fn blob_at(row: &Row<'_>, index: usize) -> Vec<u8> {
    match row.get_ref(index) {
        Ok(ValueRef::Text(bytes)) | Ok(ValueRef::Blob(bytes)) => bytes.to_vec(),
        _ => Vec::new(),
    }
}
