//! End-to-end runs of the ankiconv binary

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run_ankiconv(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ankiconv"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute ankiconv")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_missing_arguments_fail() {
    let output = run_ankiconv(&[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--input"), "stderr: {}", stderr);
}

#[test]
fn test_help_lists_flags() {
    let output = run_ankiconv(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--include-stats", "--include-suspended", "--tier", "--compact"] {
        assert!(stdout.contains(flag), "missing {} in help", flag);
    }
}

#[test]
fn test_converts_text_export() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("Capitals.txt");
    let output_path = dir.path().join("out").join("capitals.json");
    fs::write(&input, "France\tParis\nJapan\tTokyo\n").unwrap();

    let output = run_ankiconv(&["-i", path_str(&input), "-o", path_str(&output_path)]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Converted 2 cards"), "stdout: {}", stdout);

    let json = read_json(&output_path);
    assert_eq!(json["decks"][0]["name"], "Capitals");
    assert_eq!(json["decks"][0]["cards"][1]["back"], "Tokyo");
    assert_eq!(json["metadata"]["source_format"], "tsv");
}

#[test]
fn test_package_with_flags_into_directory() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("Lang::Spanish.apkg");
    fs::write(&input, common::package(&common::legacy_collection())).unwrap();
    let out_dir = dir.path().join("exports");
    fs::create_dir(&out_dir).unwrap();

    let output = run_ankiconv(&[
        "-i",
        path_str(&input),
        "-o",
        path_str(&out_dir),
        "--include-suspended",
        "--include-stats",
        "--compact",
        "--quiet",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());

    let written = out_dir.join("Lang - Spanish.json");
    let text = fs::read_to_string(&written).unwrap();
    assert_eq!(text.lines().count(), 1);

    let json = read_json(&written);
    assert_eq!(json["metadata"]["total_cards"], 5);
    let card = &json["decks"][1]["cards"][0];
    assert_eq!(card["suspended"], false);
    assert_eq!(card["stats"]["ease_factor"], 2.5);
}

#[test]
fn test_summary_prints_statistics() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("deck.apkg");
    fs::write(&input, common::package(&common::legacy_collection())).unwrap();
    let output_path = dir.path().join("deck.json");

    let output = run_ankiconv(&[
        "-i",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--summary",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(1 excluded)"), "stdout: {}", stdout);
    assert!(stdout.contains("parsing"), "stdout: {}", stdout);
}

#[test]
fn test_bad_input_reports_error_with_tip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("photo.png");
    fs::write(&input, b"\x89PNG\r\n\x1a\n").unwrap();
    let output_path = dir.path().join("never.json");

    let output = run_ankiconv(&["-i", path_str(&input), "-o", path_str(&output_path)]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[InvalidFormat]"), "stderr: {}", stderr);
    assert!(stderr.contains("Tip:"), "stderr: {}", stderr);
    assert!(!stderr.contains("--help"), "stderr: {}", stderr);
    assert!(!output_path.exists());
}

#[test]
fn test_missing_input_file() {
    let dir = tempdir().unwrap();
    let output_path = dir.path().join("never.json");
    let missing = dir.path().join("missing.apkg");

    let output = run_ankiconv(&["-i", path_str(&missing), "-o", path_str(&output_path)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output_path.exists());
}
