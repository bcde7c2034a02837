mod common;

use tempfile::TempDir;

use testdeck::definition::load_definition;
use testdeck::error::CaseError;
use testdeck::types::TestStatus;

#[test]
fn load_definition_reads_all_fields() {
    let root = TempDir::new().unwrap();
    let dir = common::write_test_dir(
        root.path(),
        "LoadOBJ",
        Some(
            r#"{
                "name": "load-obj",
                "includedirs": ["../Stardust/src"],
                "linkdirs": ["../build"],
                "links": ["stardust", "m"],
                "defines": ["STARDUST_DEBUG"]
            }"#,
        ),
    );

    let def = load_definition(&dir).unwrap();
    assert_eq!(def.name, "load-obj");
    assert_eq!(def.includedirs, vec!["../Stardust/src"]);
    assert_eq!(def.linkdirs, vec!["../build"]);
    assert_eq!(def.links, vec!["stardust", "m"]);
    assert_eq!(def.defines, vec!["STARDUST_DEBUG"]);
}

#[test]
fn missing_file_is_definition_missing() {
    let root = TempDir::new().unwrap();
    let dir = common::write_test_dir(root.path(), "NoJson", None);

    let err = load_definition(&dir).unwrap_err();
    assert!(matches!(err, CaseError::DefinitionMissing(_)));
    assert!(err.to_string().contains("MISSING 'test.json' FILE"));
}

#[test]
fn syntax_error_is_definition_syntax() {
    let root = TempDir::new().unwrap();
    let dir = common::write_test_dir(root.path(), "Broken", Some("{ \"name\": \"x\", "));

    let err = load_definition(&dir).unwrap_err();
    assert!(matches!(err, CaseError::DefinitionSyntax { .. }));
    assert!(err.to_string().contains("INVALID JSON FILE"));
}

#[test]
fn missing_list_field_is_definition_invalid() {
    let root = TempDir::new().unwrap();
    let dir = common::write_test_dir(
        root.path(),
        "NoLinks",
        Some(r#"{"name": "x", "includedirs": [], "linkdirs": [], "defines": []}"#),
    );

    let err = load_definition(&dir).unwrap_err();
    assert!(matches!(err, CaseError::DefinitionInvalid { ref field, .. } if field == "links"));
    assert!(err.to_string().contains("JSON FILE MISSING ATTRIBUTES -> links"));
}

#[test]
fn mistyped_name_is_definition_invalid() {
    let root = TempDir::new().unwrap();
    let dir = common::write_test_dir(
        root.path(),
        "NumericName",
        Some(r#"{"name": 7, "includedirs": [], "linkdirs": [], "links": [], "defines": []}"#),
    );

    let err = load_definition(&dir).unwrap_err();
    assert!(matches!(err, CaseError::DefinitionInvalid { ref field, .. } if field == "name"));
}

#[test]
fn every_load_failure_ends_at_error() {
    let failures = [
        CaseError::DefinitionMissing("test.json".into()),
        CaseError::DefinitionSyntax {
            path: "test.json".into(),
            detail: "EOF".to_string(),
        },
        CaseError::DefinitionInvalid {
            field: "links".to_string(),
            reason: "missing".to_string(),
        },
    ];
    for err in failures {
        assert!(err.is_load_failure());
        assert_eq!(err.terminal_status(), TestStatus::Error);
    }
}

#[test]
fn only_runtime_failure_ends_at_fail() {
    assert_eq!(CaseError::RuntimeFailure(42).terminal_status(), TestStatus::Fail);
    assert_eq!(
        CaseError::CompileError("cc".to_string()).terminal_status(),
        TestStatus::Error
    );
    assert_eq!(
        CaseError::BackendFault("spawn".to_string()).terminal_status(),
        TestStatus::Error
    );
    assert!(!CaseError::CompileError("cc".to_string()).is_load_failure());
}
