//! Package, collection-package and bare database inputs

mod common;

use ankiconv::{convert_bytes, CardContent, ConversionConfig, SourceFormat};
use pretty_assertions::assert_eq;
use zip::CompressionMethod;

use common::*;

fn convert(data: Vec<u8>, filename: &str) -> ankiconv::ConversionOutput {
    convert_bytes(data, filename, ConversionConfig::default()).unwrap()
}

#[test]
fn test_apkg_legacy_collection() {
    let output = convert(package(&legacy_collection()), "Sample.apkg");

    assert_eq!(output.metadata.source_format, SourceFormat::Package);
    assert_eq!(output.metadata.schema_revision.as_deref(), Some("legacy"));
    assert_eq!(output.metadata.total_cards, 4);
    assert_eq!(output.metadata.total_notes, 3);
    assert_eq!(output.metadata.total_decks, 5);

    let names: Vec<&str> = output.decks.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Default", "Geography", "Lang"]);

    let geography = output.find_deck("Geography").unwrap();
    assert_eq!(geography.description, "World capitals");
    assert_eq!(geography.cards.len(), 2);
    assert_eq!(
        geography.cards[0].content,
        CardContent::Basic {
            front: "Capital of *France*?".to_string(),
            back: "Paris".to_string(),
        }
    );
    assert_eq!(geography.cards[0].tags, vec!["geo", "europe"]);

    let verbs = output.find_deck("Lang::Spanish::Verbs").unwrap();
    assert_eq!(verbs.description, "*Regular* verbs");
    assert_eq!(verbs.cards.len(), 1);
}

#[test]
fn test_colpkg_with_anki21b_entry() {
    let database = decomposed_collection();
    let archive = zip_archive(&[
        ("collection.anki2", b"placeholder for old clients", CompressionMethod::Stored),
        ("collection.anki21b", &zstd_compress(&database), CompressionMethod::Stored),
        ("media", b"", CompressionMethod::Stored),
    ]);
    let output = convert(archive, "backup.colpkg");

    assert_eq!(output.metadata.source_format, SourceFormat::CollectionPackage);
    assert_eq!(output.metadata.schema_revision.as_deref(), Some("decomposed"));
    assert_eq!(output.metadata.total_cards, 4);

    // \x1f-separated names come out as the same hierarchy
    let verbs = output.find_deck("Lang::Spanish::Verbs").unwrap();
    assert_eq!(verbs.description, "*Regular* verbs");
    match &verbs.cards[0].content {
        CardContent::Custom {
            note_type_name,
            fields,
        } => {
            assert_eq!(note_type_name, "Vocab");
            assert_eq!(fields["Word"], "hablar");
            assert_eq!(fields["Example"], "Yo _hablo_ español");
        }
        other => panic!("expected custom card, got {:?}", other),
    }

    let geography = output.find_deck("Geography").unwrap();
    assert!(matches!(geography.cards[1].content, CardContent::Cloze { .. }));
}

#[test]
fn test_bare_databases() {
    let output = convert(legacy_collection(), "collection.anki2");
    assert_eq!(output.metadata.source_format, SourceFormat::Database);
    assert_eq!(output.metadata.total_cards, 4);

    let output = convert(zstd_compress(&decomposed_collection()), "collection.anki21b");
    assert_eq!(output.metadata.source_format, SourceFormat::CompressedDatabase);
    assert_eq!(output.metadata.total_cards, 4);
}

#[test]
fn test_legacy_and_decomposed_agree() {
    let legacy = convert(legacy_collection(), "a.anki2");
    let decomposed = convert(decomposed_collection(), "b.anki21");
    assert_eq!(legacy.decks, decomposed.decks);
    assert_eq!(legacy.metadata.note_type_names, decomposed.metadata.note_type_names);
}

#[test]
fn test_signature_wins_over_extension() {
    let output = convert(package(&legacy_collection()), "mislabelled.txt");
    assert_eq!(output.metadata.source_format, SourceFormat::Package);
}

#[test]
fn test_zip_bomb_rejected() {
    let zeros = vec![0u8; 2 * 1024 * 1024];
    let archive = zip_archive(&[("collection.anki2", &zeros, CompressionMethod::Deflated)]);
    let err = convert_bytes(archive, "bomb.apkg", ConversionConfig::default()).unwrap_err();
    assert_eq!(err.kind.code(), "ResourceLimitExceeded");
    assert_eq!(err.record.as_deref(), Some("collection.anki2"));
}

#[test]
fn test_package_without_collection_is_corrupted() {
    let archive = zip_archive(&[("media", b"{}", CompressionMethod::Stored)]);
    let err = convert_bytes(archive, "empty.apkg", ConversionConfig::default()).unwrap_err();
    assert_eq!(err.kind.code(), "CorruptedFile");
}

#[test]
fn test_truncated_package_is_corrupted() {
    let mut archive = package(&legacy_collection());
    archive.truncate(archive.len() / 2);
    let err = convert_bytes(archive, "cut.apkg", ConversionConfig::default()).unwrap_err();
    assert_eq!(err.kind.code(), "CorruptedFile");
}

#[test]
fn test_unrecognized_input() {
    let err = convert_bytes(b"\x00\x01\x02".to_vec(), "mystery.bin", ConversionConfig::default())
        .unwrap_err();
    assert_eq!(err.kind.code(), "InvalidFormat");
}
