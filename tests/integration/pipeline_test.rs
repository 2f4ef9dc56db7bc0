//! Progress, cancellation and output-shape behavior of the pipeline

mod common;

use std::cell::RefCell;

use ankiconv::{
    CardContent, ConversionConfig, ConversionPipeline, Deck, InputSource, ProgressEvent, Stage,
};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use common::*;

fn sample_input() -> InputSource {
    InputSource::from_bytes(package(&legacy_collection()), "Sample.apkg")
}

fn all_cards(decks: &[Deck]) -> Vec<&ankiconv::OutputCard> {
    decks
        .iter()
        .flat_map(|deck| deck.cards.iter().chain(all_cards(&deck.subdecks)))
        .collect()
}

#[test]
fn test_progress_is_monotonic_and_complete() {
    let events = RefCell::new(Vec::new());
    let sink = |event: ProgressEvent| events.borrow_mut().push(event);
    let pipeline = ConversionPipeline::new(ConversionConfig::default().with_cancel_check_interval(1));
    pipeline.convert(&sample_input(), &sink).unwrap();

    let events = events.into_inner();
    assert!(events.windows(2).all(|pair| pair[0].percent <= pair[1].percent));
    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Done);
    assert_eq!(last.percent, 100);

    for stage in [
        Stage::Detecting,
        Stage::Parsing,
        Stage::Extracting,
        Stage::Transforming,
        Stage::Building,
    ] {
        assert!(events.iter().any(|e| e.stage == stage), "missing {:?}", stage);
    }
    assert!(events
        .iter()
        .filter(|e| e.stage != Stage::Done)
        .all(|e| e.percent <= 99));
}

#[test]
fn test_cancellation_during_parsing_produces_no_output() {
    let pipeline = ConversionPipeline::new(ConversionConfig::default());
    let token = pipeline.cancellation_token();
    let events = RefCell::new(Vec::new());
    let sink = |event: ProgressEvent| {
        if event.stage == Stage::Parsing {
            token.cancel();
        }
        events.borrow_mut().push(event.stage);
    };

    let err = pipeline.convert(&sample_input(), &sink).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.stage, Some(Stage::Parsing));
    let stages = events.into_inner();
    assert_eq!(stages.last(), Some(&Stage::Failed));
    assert!(!stages.contains(&Stage::Done));
}

#[test]
fn test_suspended_cards_excluded_by_default() {
    let report = ConversionPipeline::default()
        .convert_quiet(&sample_input())
        .unwrap();
    let output = report.output;

    let cards = all_cards(&output.decks);
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|card| card.suspended.is_none() && card.stats.is_none()));
    assert!(cards.iter().all(|card| card.id != 1004));
    assert_eq!(report.statistics.cards_excluded, 1);
    assert_eq!(report.statistics.cards_included, 4);
    assert_eq!(report.statistics.output_cards, 3);
}

#[test]
fn test_suspended_and_stats_included_on_request() {
    let config = ConversionConfig::default()
        .with_suspended(true)
        .with_stats(true);
    let output = ConversionPipeline::new(config)
        .convert_quiet(&sample_input())
        .unwrap()
        .output;

    assert_eq!(output.metadata.total_cards, 5);
    let geography = output.find_deck("Geography").unwrap();
    assert_eq!(geography.cards.len(), 3);
    let flags: Vec<Option<bool>> = geography.cards.iter().map(|c| c.suspended).collect();
    assert_eq!(flags, vec![Some(false), Some(false), Some(true)]);

    let stats = geography.cards[0].stats.as_ref().unwrap();
    assert_eq!(stats.interval, 4);
    assert_eq!(stats.ease_factor, 2.5);
    assert_eq!(stats.repetitions, 7);
    assert_eq!(stats.lapses, 1);
}

#[test]
fn test_cloze_cards_of_one_note_merge() {
    let output = ConversionPipeline::default()
        .convert_quiet(&sample_input())
        .unwrap()
        .output;
    let geography = output.find_deck("Geography").unwrap();

    let cloze = &geography.cards[1];
    assert_eq!(cloze.id, 1001);
    assert!(cloze.tags.is_empty());
    assert_matches!(&cloze.content, CardContent::Cloze { text, clozes, extra } => {
        assert_eq!(text, "{{c1::Paris}} is the capital of {{c2::France::country}}");
        assert_eq!(extra.as_deref(), Some("Europe"));
        assert_eq!(clozes.len(), 2);
        assert_eq!(clozes[0].index, 1);
        assert_eq!(clozes[0].answer, "Paris");
        assert!(clozes[0].masked_text.starts_with("[...] is the capital of"));
        assert_eq!(clozes[1].index, 2);
        assert_eq!(clozes[1].hint.as_deref(), Some("country"));
        assert!(clozes[1].masked_text.ends_with("capital of [country]"));
    });
}

#[test]
fn test_three_level_hierarchy_and_empty_decks() {
    let output = ConversionPipeline::default()
        .convert_quiet(&sample_input())
        .unwrap()
        .output;

    let default = output.find_deck("Default").unwrap();
    assert!(default.cards.is_empty());
    assert!(default.subdecks.is_empty());

    let lang = output.find_deck("Lang").unwrap();
    assert!(lang.cards.is_empty());
    let spanish = lang.subdeck("Spanish").unwrap();
    assert!(spanish.cards.is_empty());
    let verbs = spanish.subdeck("Verbs").unwrap();
    assert_eq!(verbs.cards.len(), 1);
    assert!(verbs.subdecks.is_empty());
}

#[test]
fn test_serialized_document_shape() {
    let report = ConversionPipeline::default()
        .convert_quiet(&sample_input())
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json(false).unwrap()).unwrap();

    let metadata = &json["metadata"];
    assert_eq!(metadata["source_format"], "apkg");
    assert_eq!(metadata["total_cards"], 4);
    assert_eq!(metadata["note_type_names"], serde_json::json!(["Basic", "Cloze", "Vocab"]));
    assert!(metadata["converted_at"].is_string());

    let geography = &json["decks"][1];
    assert_eq!(geography["name"], "Geography");
    assert!(geography.get("subdecks").is_none());
    let card = &geography["cards"][0];
    assert_eq!(card["type"], "basic");
    assert_eq!(card["front"], "Capital of *France*?");
    assert!(card["tags"].is_array());
    assert!(card.get("stats").is_none());

    // every card carries a tags array
    fn check_tags(deck: &serde_json::Value) {
        for card in deck["cards"].as_array().unwrap() {
            assert!(card["tags"].is_array());
        }
        if let Some(subdecks) = deck.get("subdecks") {
            subdecks.as_array().unwrap().iter().for_each(check_tags);
        }
    }
    json["decks"].as_array().unwrap().iter().for_each(check_tags);
}

#[test]
fn test_orphans_are_reported_not_fatal() {
    let mut notes = sample_notes();
    notes.retain(|(id, ..)| *id != 102);
    let mut cards = sample_cards();
    cards.push((1005, 100, 77, 0, 0));
    let database = legacy_collection_with(&notes, &cards);

    let output = ConversionPipeline::default()
        .convert_quiet(&InputSource::from_bytes(database, "orphans.anki2"))
        .unwrap()
        .output;

    // card 1003 lost its note; card 1005 points at a deck that does not exist
    assert!(all_cards(&output.decks).iter().all(|card| card.id != 1003));
    assert!(all_cards(&output.decks).iter().any(|card| card.id == 1005));
    assert!(!output.metadata.warnings.is_empty());
}

#[test]
fn test_input_limit_applies_before_parsing() {
    let config = ConversionConfig::default().with_max_input_size(1024);
    let err = ConversionPipeline::new(config)
        .convert_quiet(&sample_input())
        .unwrap_err();
    assert_eq!(err.kind.code(), "ResourceLimitExceeded");
    assert_eq!(err.stage, Some(Stage::Detecting));
}
