//! Tests for row file loading.

use bulksend::import::{load_rows, parse_rows};

#[test]
fn phones_become_ordered_destinations() {
    let json = r#"[
        {"name": "Ali", "civil_id": "C1", "phone1": "111", "phone2": "222", "phone3": "111", "message": "hi Ali"},
        {"name": "Sara", "phone1": "333", "message": "hi Sara"}
    ]"#;
    let rows = parse_rows(json).expect("rows should parse");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].index, 0);
    assert_eq!(rows[0].destinations, vec!["111", "222"]);
    assert_eq!(rows[1].index, 1);
    assert_eq!(rows[1].civil_id, "");
    assert_eq!(rows[1].destinations, vec!["333"]);
    assert_eq!(rows[1].message, "hi Sara");
}

#[test]
fn blank_primary_phone_falls_through_to_fallbacks() {
    let json = r#"[{"name": "Ali", "phone1": "  ", "phone2": "222", "message": "hi"}]"#;
    let rows = parse_rows(json).expect("rows should parse");
    assert_eq!(rows[0].destinations, vec!["222"]);
}

#[test]
fn missing_message_is_rejected() {
    let json = r#"[{"name": "Ali", "phone1": "111"}]"#;
    let err = parse_rows(json).expect_err("message is required");
    assert!(err.to_string().contains("failed to parse imported rows"));
}

#[test]
fn load_rows_reads_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("rows.json");
    std::fs::write(&path, r#"[{"name": "Ali", "phone1": "111", "message": "hi"}]"#)
        .expect("write rows");
    let rows = load_rows(&path).expect("rows should load");
    assert_eq!(rows.len(), 1);
}

#[test]
fn load_rows_reports_missing_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let err = load_rows(&tmp.path().join("absent.json")).expect_err("missing file");
    assert!(err.to_string().contains("failed to read rows"));
}
