use persistent_lru::{
    parse_script, replay, replay_stream, replay_with_warnings, ReplayErrorKind, ReplayOptions,
    ReplayWarningKind,
};
use serde_json::json;

#[test]
fn zero_capacity_warns_once_and_evicts_every_put() {
    let yaml = r#"
version: 1
cache:
  capacity: 0
ops:
  - { op: put, key: a, value: 1, expect: a }
  - { op: put, key: b, value: 2, expect: b }
  - { op: get, key: a, expect: null }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let (output, warnings) =
        replay_with_warnings(&script, None, ReplayOptions::default()).expect("replay failed");

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, ReplayWarningKind::ZeroCapacity);
    assert_eq!(warnings[0].path.as_deref(), Some("cache.capacity"));
    assert_eq!(output.stats.evictions, 2);
    assert_eq!(output.snapshot.len, 0);
    assert_eq!(output.snapshot.next_stamp, 0);
}

#[test]
fn mismatched_expectation_is_a_warning_by_default() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
ops:
  - { op: put, key: a, value: 1 }
  - { op: get, key: a, expect: 2 }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let (_, warnings) =
        replay_with_warnings(&script, None, ReplayOptions::default()).expect("replay failed");

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, ReplayWarningKind::ExpectationMismatch);
    assert_eq!(warnings[0].path.as_deref(), Some("ops[1].expect"));
}

#[test]
fn strict_mode_fails_on_mismatched_eviction() {
    let yaml = r#"
version: 1
cache:
  capacity: 1
ops:
  - { op: put, key: a, value: 1 }
  - { op: put, key: b, value: 2, expect: null }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let err = replay_with_warnings(&script, None, ReplayOptions { strict: true }).unwrap_err();

    assert_eq!(err.kind, ReplayErrorKind::ExpectationFailed);
    assert_eq!(err.path.as_deref(), Some("ops[1].expect"));
    assert!(err.message.contains("\"a\""), "message: {}", err.message);
}

#[test]
fn replaying_an_equal_value_reports_no_eviction() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
ops:
  - { op: put, key: a, value: 1 }
  - { op: put, key: b, value: 2 }
  - { op: put, key: a, value: 1, expect: null }
  - { op: put, key: c, value: 3, expect: b }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let (output, warnings) =
        replay_with_warnings(&script, None, ReplayOptions { strict: true }).expect("replay failed");

    assert!(warnings.is_empty());
    let keys: Vec<&str> = output
        .snapshot
        .entries
        .iter()
        .map(|entry| entry.key.as_str())
        .collect();
    assert_eq!(keys, vec!["a", "c"]);
}

#[test]
fn negative_capacity_fails_replay() {
    let yaml = r#"
version: 1
cache:
  capacity: -3
ops:
  - { op: get, key: a }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let err = replay(&script, None).unwrap_err();
    assert_eq!(err.kind, ReplayErrorKind::InvalidCapacity);
    assert_eq!(err.path.as_deref(), Some("cache.capacity"));
}

#[test]
fn invalid_input_record_reports_its_index() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
input:
  format: json
  json: {}
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let input = r#"[{ "op": "put", "key": "a", "value": 1 }, { "op": "put", "key": "b" }]"#;
    let err = replay(&script, Some(input)).unwrap_err();
    assert_eq!(err.kind, ReplayErrorKind::InvalidOp);
    assert_eq!(err.path.as_deref(), Some("input[1]"));
}

#[test]
fn input_section_requires_input_text() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
input:
  format: json
  json: {}
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let err = replay(&script, None).unwrap_err();
    assert_eq!(err.kind, ReplayErrorKind::InvalidInput);
}

#[test]
fn csv_without_header_uses_declared_columns() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
input:
  format: csv
  csv:
    has_header: false
    delimiter: ";"
    columns: [op, key, value]
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let input = "put;a;\"hello\"\nget;a;\n";
    let output = replay(&script, Some(input)).expect("replay failed");
    assert_eq!(output.steps[1].value, Some(json!("hello")));
}

#[test]
fn unknown_csv_column_is_rejected() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
input:
  format: csv
  csv: {}
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let err = replay(&script, Some("op,key,vaule\nput,a,1\n")).unwrap_err();
    assert_eq!(err.kind, ReplayErrorKind::InvalidInput);
    assert!(err.message.contains("vaule"));
}

#[test]
fn stream_stops_after_first_error() {
    let yaml = r#"
version: 1
cache:
  capacity: 2
ops:
  - { op: put, key: a, value: 1 }
  - { op: get, key: a, expect: 9 }
  - { op: put, key: b, value: 2 }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let mut stream =
        replay_stream(&script, None, ReplayOptions { strict: true }).expect("stream failed");

    assert!(stream.next().expect("first item").is_ok());
    assert!(stream.next().expect("second item").is_err());
    assert!(stream.next().is_none());
    assert_eq!(stream.snapshot().len, 1);
}

#[test]
fn stream_cache_versions_survive_later_steps() {
    let yaml = r#"
version: 1
cache:
  capacity: 1
ops:
  - { op: put, key: x, value: 1 }
  - { op: put, key: y, value: 2, expect: x }
"#;
    let script = parse_script(yaml).expect("failed to parse script");
    let mut stream =
        replay_stream(&script, None, ReplayOptions::default()).expect("stream failed");

    stream.next().expect("first step").expect("step failed");
    let after_first = stream.cache().clone();
    stream.next().expect("second step").expect("step failed");

    assert_eq!(after_first.peek(&"x".to_string()), Some(&json!(1)));
    assert!(!after_first.contains_key(&"y".to_string()));
    assert_eq!(stream.cache().peek(&"y".to_string()), Some(&json!(2)));
    assert_eq!(stream.cache().len(), 1);
}
