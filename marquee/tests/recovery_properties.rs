use marquee::collaborators::RawAgentOutput;
use marquee::recovery::{recover, RecoveredValue, RecoveryStage, StructuredTextRecoverer};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn titles(value: RecoveredValue) -> Vec<String> {
    value
        .into_records()
        .iter()
        .filter_map(|r| r.get("title").and_then(Value::as_str).map(String::from))
        .collect()
}

#[test]
fn test_recovery_is_total() {
    let inputs = [
        "",
        "I couldn't find anything, sorry!",
        r#"[{"title":"A","url":"https://x/1"},{"title":"B""#,
        r#"[{"title": "A",}, {"title": "B",},]"#,
        "[{'title': 'A'}, {'title': 'B'}]",
        "```json\n[{\"title\": \"A\"\n```",
        "{{{{[[[[",
        "]]]]}}}}",
        r#""just a string""#,
        "null",
        r#"{"movies_json": "[{\"title\": \"A\" {\"title\": "#,
        "\u{1F3AC} ```\n{'title': 'Ünïcödé ✓'}\n```",
    ];
    for input in inputs {
        // Must terminate and produce a typed (possibly empty) value
        let value = recover(&RawAgentOutput::text(input));
        let _ = value.len();
    }
}

#[test]
fn test_valid_json_is_not_repaired() {
    let recoverer = StructuredTextRecoverer::default();
    let inputs = [
        r#"[{"title": "It's, like, [weird]}"}]"#,
        r#"{"title": "A", "tags": ["x", "y"]}"#,
        "[]",
    ];
    for input in inputs {
        let recovery = recoverer.recover_text(input);
        assert_eq!(recovery.stage, RecoveryStage::DirectParse, "input: {}", input);
        let expected: Value = serde_json::from_str(input).unwrap();
        let got = match recovery.value {
            RecoveredValue::Sequence(records) => {
                Value::Array(records.into_iter().map(Value::Object).collect())
            }
            RecoveredValue::Mapping(map) => Value::Object(map),
        };
        assert_eq!(got, expected);
    }
}

#[test]
fn test_concatenated_objects_recover_as_sequence() {
    let value = recover(&RawAgentOutput::text(r#"{"title":"A"}{"title":"B"}"#));
    assert_eq!(
        value,
        RecoveredValue::Sequence(vec![
            json!({"title": "A"}).as_object().cloned().unwrap(),
            json!({"title": "B"}).as_object().cloned().unwrap(),
        ])
    );
}

#[test]
fn test_truncated_array_keeps_complete_record() {
    let value = recover(&RawAgentOutput::text(
        r#"[{"title":"A","url":"https://x/1"},{"title":"B","url":"https://x/2""#,
    ));
    let records = value.into_records();
    assert!(!records.is_empty());
    assert_eq!(records[0]["title"], "A");
    assert_eq!(records[0]["url"], "https://x/1");
}

#[test]
fn test_single_quotes_and_trailing_commas() {
    let value = recover(&RawAgentOutput::text(
        "[{'title': 'Amélie', 'year': 2001,}, {'title': 'Léon', 'year': 1994,},]",
    ));
    assert_eq!(titles(value), vec!["Amélie", "Léon"]);
}

#[test]
fn test_prose_around_fenced_json() {
    let text = "Here are my top picks for tonight:\n\n```json\n[\n  {\"title\": \"Wicked\", \"tmdb_id\": 402431}\n  {\"title\": \"Gladiator II\", \"tmdb_id\": 558449}\n]\n```\n\nEnjoy the show!";
    let recovery = StructuredTextRecoverer::default().recover_text(text);
    assert_eq!(recovery.stage, RecoveryStage::CodeBlock);
    assert_eq!(titles(recovery.value), vec!["Wicked", "Gladiator II"]);
}

#[test]
fn test_nested_movies_json_field() {
    // The outer object is invalid too (trailing comma), so repair runs
    let text = r#"{"movies_json": "[{\"title\": \"Moana 2\", \"tmdb_id\": 1241982,}]",}"#;
    let recovery = StructuredTextRecoverer::default().recover_text(text);
    assert_eq!(recovery.stage, RecoveryStage::PreRepair);
    assert_eq!(
        recovery.value,
        RecoveredValue::Sequence(vec![json!({"title": "Moana 2", "tmdb_id": 1241982})
            .as_object()
            .cloned()
            .unwrap()])
    );
}

#[test]
fn test_valid_wrapper_is_unwrapped() {
    let text = r#"{"movies_json": "[{\"title\": \"A\"}, {\"title\": \"B\"}]"}"#;
    let recovery = StructuredTextRecoverer::default().recover_text(text);
    assert_eq!(recovery.stage, RecoveryStage::DirectParse);
    assert_eq!(titles(recovery.value), vec!["A", "B"]);
}

#[test]
fn test_unrepairable_nested_payload_falls_back_to_titles() {
    let text = r#"{"movies_json": "[{\"title\": \"Dune: Part Two\", \"id\": 1 {\"title\": \"Wicked\""#;
    let recovery = StructuredTextRecoverer::default().recover_text(text);
    assert_eq!(recovery.stage, RecoveryStage::DomainFallback);
    assert_eq!(titles(recovery.value), vec!["Dune: Part Two", "Wicked"]);
}

#[test]
fn test_single_quoted_values_without_commas() {
    let recovery = StructuredTextRecoverer::default().recover_text("[{'title': 'A' 'year': 2001}]");
    assert_eq!(recovery.stage, RecoveryStage::PreRepair);
    assert_eq!(
        recovery.value.into_records()[0],
        json!({"title": "A", "year": 2001}).as_object().cloned().unwrap()
    );
}

#[test]
fn test_python_literal_output() {
    let recovery = StructuredTextRecoverer::default().recover_text(
        "[{'title': 'A', 'adult': False, 'rating': None}, {'title': 'B', 'adult': True, 'rating': 7.5}]",
    );
    assert_eq!(recovery.stage, RecoveryStage::PreRepair);
    let records = recovery.value.into_records();
    assert_eq!(records[0]["adult"], json!(false));
    assert_eq!(records[0]["rating"], Value::Null);
    assert_eq!(records[1]["adult"], json!(true));
}

#[test]
fn test_bare_word_values_are_quoted() {
    let recovery = StructuredTextRecoverer::default()
        .recover_text(r#"[{"title": "A", "status": released}]"#);
    assert_eq!(recovery.stage, RecoveryStage::TargetedRepair);
    assert_eq!(recovery.value.into_records()[0]["status"], "released");
}

#[test]
fn test_cut_inside_last_key_keeps_earlier_records() {
    let recovery = StructuredTextRecoverer::default()
        .recover_text(r#"[{"title":"A","url":"https://x/1"},{"title":"B","ur"#);
    assert_eq!(recovery.stage, RecoveryStage::NearEndTruncation);
    assert_eq!(titles(recovery.value), vec!["A"]);
}

#[test]
fn test_native_output_skips_text_stages() {
    let raw = RawAgentOutput::Native(json!([{"title": "A"}, "noise", {"title": "B"}]));
    let recovery = StructuredTextRecoverer::default().recover_with_stage(&raw);
    assert_eq!(recovery.stage, RecoveryStage::Native);
    assert_eq!(titles(recovery.value), vec!["A", "B"]);
}

#[test]
fn test_unrecoverable_text_yields_empty_sequence() {
    let recovery = StructuredTextRecoverer::default()
        .recover_text("The theaters near you are all closed today.");
    assert_eq!(recovery.stage, RecoveryStage::Empty);
    assert_eq!(recovery.value, RecoveredValue::Sequence(Vec::new()));
}
