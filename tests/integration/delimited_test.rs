//! Tab-separated text exports through the full pipeline

use ankiconv::{convert_bytes, convert_file, CardContent, ConversionConfig, SourceFormat};
use pretty_assertions::assert_eq;

fn convert(text: &str, filename: &str) -> ankiconv::ConversionOutput {
    convert_bytes(text.as_bytes().to_vec(), filename, ConversionConfig::default()).unwrap()
}

fn basic(front: &str, back: &str) -> CardContent {
    CardContent::Basic {
        front: front.to_string(),
        back: back.to_string(),
    }
}

#[test]
fn test_two_column_file_named_after_input() {
    let output = convert("hola\thello\nadiós\tgoodbye\n", "Spanish Basics.txt");

    assert_eq!(output.metadata.source_format, SourceFormat::DelimitedText);
    assert_eq!(output.metadata.schema_revision, None);
    assert_eq!(output.metadata.total_cards, 2);
    assert_eq!(output.metadata.total_decks, 1);

    let deck = &output.decks[0];
    assert_eq!(deck.name, "Spanish Basics");
    assert_eq!(deck.cards[0].content, basic("hola", "hello"));
    assert_eq!(deck.cards[1].content, basic("adiós", "goodbye"));
    assert!(deck.cards.iter().all(|card| card.tags.is_empty()));
}

#[test]
fn test_headers_tags_and_hierarchy() {
    let text = "#separator:tab\n#deck:Lang::Spanish\n\
                hablar\tto <b>speak</b>\tverbs regular\n\
                comer\tto eat\tverbs\n";
    let output = convert(text, "ignored.tsv");

    assert_eq!(output.decks.len(), 1);
    assert_eq!(output.decks[0].name, "Lang");
    assert!(output.decks[0].cards.is_empty());

    let spanish = output.find_deck("Lang::Spanish").unwrap();
    assert_eq!(spanish.cards.len(), 2);
    assert_eq!(spanish.cards[0].content, basic("hablar", "to *speak*"));
    assert_eq!(spanish.cards[0].tags, vec!["verbs", "regular"]);
    assert_eq!(spanish.cards[1].tags, vec!["verbs"]);
    assert_eq!(output.metadata.total_decks, 2);
}

#[test]
fn test_escapes_and_line_endings() {
    let output = convert("one\\ntwo\tcol\\tumn\r\nback\\\\slash\tx\r\n", "notes.txt");
    let cards = &output.decks[0].cards;
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].content, basic("one\ntwo", "col umn"));
    assert_eq!(cards[1].content, basic("back\\slash", "x"));
}

#[test]
fn test_wide_rows_become_custom_cards() {
    let output = convert(
        "#notetype:Vocab\n#tags column:4\nperro\tdog\t<i>el</i> perro\tanimals\n",
        "vocab.txt",
    );
    match &output.decks[0].cards[0].content {
        CardContent::Custom {
            note_type_name,
            fields,
        } => {
            assert_eq!(note_type_name, "Vocab");
            let names: Vec<&str> = fields.keys().map(String::as_str).collect();
            assert_eq!(names, vec!["Front", "Back", "Field 3"]);
            assert_eq!(fields["Field 3"], "_el_ perro");
        }
        other => panic!("expected custom card, got {:?}", other),
    }
    assert_eq!(output.decks[0].cards[0].tags, vec!["animals"]);
}

#[test]
fn test_empty_file_yields_empty_deck() {
    let output = convert("", "empty.txt");
    assert_eq!(output.decks.len(), 1);
    assert_eq!(output.decks[0].name, "empty");
    assert!(output.decks[0].cards.is_empty());
    assert_eq!(output.metadata.total_cards, 0);
}

#[test]
fn test_bad_header_is_parse_error() {
    let err = convert_bytes(
        b"#tags column:zero\na\tb\n".to_vec(),
        "bad.txt",
        ConversionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind.code(), "ParseError");
    assert!(err.user_message().contains("line 1"));
}

#[test]
fn test_convert_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Capitals.tsv");
    std::fs::write(&path, "France\tParis\nJapan\tTokyo\n").unwrap();

    let output = convert_file(&path).unwrap();
    assert_eq!(output.decks[0].name, "Capitals");
    assert_eq!(output.metadata.total_cards, 2);

    let err = convert_file(dir.path().join("missing.tsv")).unwrap_err();
    assert_eq!(err.kind.code(), "InvalidFormat");
}
