//! Collection fixtures built on the fly with rusqlite, zip and zstd
#![allow(dead_code)]

use std::io::{Cursor, Write};

use rusqlite::{params, Connection};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const FIELD_SEPARATOR: &str = "\x1f";

/// One card row: (id, note id, deck id, ordinal, queue)
pub type CardRow = (i64, i64, i64, i64, i64);

const LEGACY_SCHEMA: &str = r#"
    CREATE TABLE col (id integer primary key, crt integer, mod integer, ver integer,
                      models text, decks text);
    CREATE TABLE notes (id integer primary key, guid text, mid integer, mod integer,
                        tags text, flds text);
    CREATE TABLE cards (id integer primary key, nid integer, did integer, ord integer,
                        type integer, queue integer, due integer, ivl integer,
                        factor integer, reps integer, lapses integer, odid integer);
"#;

const DECOMPOSED_SCHEMA: &str = r#"
    CREATE TABLE col (id integer primary key, crt integer, mod integer, ver integer);
    CREATE TABLE notetypes (id integer primary key, name text, config blob);
    CREATE TABLE fields (ntid integer, ord integer, name text, config blob);
    CREATE TABLE templates (ntid integer, ord integer, name text, config blob);
    CREATE TABLE decks (id integer primary key, name text, kind blob);
    CREATE TABLE notes (id integer primary key, guid text, mid integer, mod integer,
                        tags text, flds text);
    CREATE TABLE cards (id integer primary key, nid integer, did integer, ord integer,
                        type integer, queue integer, due integer, ivl integer,
                        factor integer, reps integer, lapses integer, odid integer);
"#;

const MODELS: &str = r#"{
    "10": {"name": "Basic", "type": 0,
           "flds": [{"name": "Front", "ord": 0}, {"name": "Back", "ord": 1}],
           "tmpls": [{"name": "Card 1", "ord": 0, "qfmt": "{{Front}}", "afmt": "{{Back}}"}]},
    "20": {"name": "Cloze", "type": 1,
           "flds": [{"name": "Text", "ord": 0}, {"name": "Back Extra", "ord": 1}],
           "tmpls": [{"name": "Cloze", "ord": 0, "qfmt": "{{cloze:Text}}", "afmt": "{{cloze:Text}}"}]},
    "30": {"name": "Vocab", "type": 0,
           "flds": [{"name": "Word", "ord": 0}, {"name": "Meaning", "ord": 1}, {"name": "Example", "ord": 2}],
           "tmpls": [{"name": "Recognition", "ord": 0, "qfmt": "{{Word}}", "afmt": "{{Meaning}}"}]}
}"#;

const DECKS: &str = r#"{
    "1": {"name": "Default", "desc": ""},
    "2": {"name": "Lang::Spanish::Verbs", "desc": "<b>Regular</b> verbs", "conf": 1},
    "3": {"name": "Lang::Spanish", "desc": ""},
    "4": {"name": "Geography", "desc": "World capitals", "conf": 1}
}"#;

/// Note rows shared by both schema revisions: (id, note type, fields, tags)
pub fn sample_notes() -> Vec<(i64, i64, Vec<&'static str>, &'static str)> {
    vec![
        (100, 10, vec!["Capital of <b>France</b>?", "Paris&nbsp;"], " geo europe "),
        (
            101,
            20,
            vec!["{{c1::Paris}} is the capital of {{c2::France::country}}", "Europe"],
            "",
        ),
        (102, 30, vec!["hablar", "to speak", "Yo <i>hablo</i> español"], "verbs"),
        (103, 10, vec!["Suspended question", "Suspended answer"], "leech"),
    ]
}

/// Cards: one basic, two cloze cards of the same note, one custom, one suspended
pub fn sample_cards() -> Vec<CardRow> {
    vec![
        (1000, 100, 4, 0, 2),
        (1001, 101, 4, 0, 0),
        (1002, 101, 4, 1, 0),
        (1003, 102, 2, 0, 1),
        (1004, 103, 4, 0, -1),
    ]
}

fn build_db(schema: &str, populate: impl FnOnce(&Connection)) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collection.anki2");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(schema).unwrap();
    populate(&conn);
    drop(conn);
    std::fs::read(path).unwrap()
}

fn insert_notes_and_cards(
    conn: &Connection,
    notes: &[(i64, i64, Vec<&str>, &str)],
    cards: &[CardRow],
) {
    for (id, note_type, fields, tags) in notes {
        conn.execute(
            "INSERT INTO notes VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![id, format!("guid{}", id), note_type, tags, fields.join(FIELD_SEPARATOR)],
        )
        .unwrap();
    }
    for (id, note, deck, ordinal, queue) in cards {
        let card_type = if *queue < 0 { 2 } else { *queue };
        conn.execute(
            "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, ?5, ?6, 12, 4, 2500, 7, 1, 0)",
            params![id, note, deck, ordinal, card_type, queue],
        )
        .unwrap();
    }
}

/// Legacy (version 11) collection with the sample notes and cards
pub fn legacy_collection() -> Vec<u8> {
    legacy_collection_with(&sample_notes(), &sample_cards())
}

pub fn legacy_collection_with(notes: &[(i64, i64, Vec<&str>, &str)], cards: &[CardRow]) -> Vec<u8> {
    build_db(LEGACY_SCHEMA, |conn| {
        conn.execute(
            "INSERT INTO col VALUES (1, 1600000000, 1600000001000, 11, ?1, ?2)",
            params![MODELS, DECKS],
        )
        .unwrap();
        insert_notes_and_cards(conn, notes, cards);
    })
}

/// Length-delimited protobuf field with a short payload
pub fn proto_bytes(field: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 128);
    let mut out = vec![(field << 3) | 2, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

/// Varint protobuf field with a small value
pub fn proto_varint(field: u8, value: u8) -> Vec<u8> {
    assert!(value < 128);
    vec![field << 3, value]
}

/// Decomposed (version 18) collection holding the same content as
/// [`legacy_collection`]. Note-type kinds and deck settings are protobuf
/// blobs; template settings are JSON.
pub fn decomposed_collection() -> Vec<u8> {
    build_db(DECOMPOSED_SCHEMA, |conn| {
        conn.execute("INSERT INTO col VALUES (1, 1600000000, 1600000001000, 18)", [])
            .unwrap();

        let note_types: [(i64, &str, u8, &[&str], &str); 3] = [
            (10, "Basic", 0, &["Front", "Back"], "{{Front}}"),
            (20, "Cloze", 1, &["Text", "Back Extra"], "{{cloze:Text}}"),
            (30, "Vocab", 0, &["Word", "Meaning", "Example"], "{{Word}}"),
        ];
        for (id, name, kind, fields, question) in note_types {
            conn.execute(
                "INSERT INTO notetypes VALUES (?1, ?2, ?3)",
                params![id, name, proto_varint(1, kind)],
            )
            .unwrap();
            for (ordinal, field) in fields.iter().enumerate() {
                conn.execute(
                    "INSERT INTO fields VALUES (?1, ?2, ?3, ?4)",
                    params![id, ordinal as i64, field, Vec::<u8>::new()],
                )
                .unwrap();
            }
            let template = format!(r#"{{"qfmt": "{}", "afmt": ""}}"#, question);
            conn.execute(
                "INSERT INTO templates VALUES (?1, 0, 'Card 1', ?2)",
                params![id, template.into_bytes()],
            )
            .unwrap();
        }

        let normal_deck = |description: &str| {
            let mut normal = proto_varint(1, 1);
            normal.extend(proto_bytes(4, description.as_bytes()));
            proto_bytes(1, &normal)
        };
        let decks = [
            (1, "Default".to_string(), normal_deck("")),
            (2, ["Lang", "Spanish", "Verbs"].join(FIELD_SEPARATOR), normal_deck("<b>Regular</b> verbs")),
            (3, ["Lang", "Spanish"].join(FIELD_SEPARATOR), normal_deck("")),
            (4, "Geography".to_string(), normal_deck("World capitals")),
        ];
        for (id, name, kind) in decks {
            conn.execute("INSERT INTO decks VALUES (?1, ?2, ?3)", params![id, name, kind])
                .unwrap();
        }

        insert_notes_and_cards(conn, &sample_notes(), &sample_cards());
    })
}

/// Zip archive with the given entries
pub fn zip_archive(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, method) in entries {
        let options = SimpleFileOptions::default().compression_method(*method);
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// `.apkg` holding `database` as `collection.anki2` next to a media map
pub fn package(database: &[u8]) -> Vec<u8> {
    zip_archive(&[
        ("collection.anki2", database, CompressionMethod::Stored),
        ("media", b"{}", CompressionMethod::Stored),
    ])
}

pub fn zstd_compress(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 3).unwrap()
}
