mod common;

use std::fs;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::RecordingRenderer;
use testdeck::backend::MockBackend;
use testdeck::config::ToolchainConfig;
use testdeck::scheduler::{clean_all, run_scheduler, RunParams};
use testdeck::test_case::{artifact_path, obj_dir};
use testdeck::types::TestStatus;

#[tokio::test]
async fn clean_after_run_removes_artifacts_and_logs() {
    let root = common::setup_test_root(&["A", "B"]);
    let cases = common::discover(root.path());
    let backend = Arc::new(MockBackend::new());
    let mut renderer = RecordingRenderer::default();

    run_scheduler(
        &cases,
        Arc::clone(&backend),
        Arc::new(ToolchainConfig::default()),
        RunParams::default(),
        &mut renderer,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    for case in &cases {
        assert!(artifact_path(case.dir()).exists());
        assert!(case.dir().join("log.log").exists());
    }
    let compiled_before = backend.compiled().len();

    let failures = clean_all(&cases);
    assert!(failures.is_empty(), "{:?}", failures);

    for case in &cases {
        assert!(!artifact_path(case.dir()).exists());
        assert!(!obj_dir(case.dir()).exists());
        assert!(!case.dir().join("log.log").exists());
        assert!(case.dir().join("main.c").exists());
        assert!(case.dir().join("test.json").exists());
        assert_eq!(case.status(), TestStatus::Stopped);
        assert!(!case.is_valid());
    }
    assert_eq!(backend.compiled().len(), compiled_before);
}

fn root_entries(root: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn run_then_clean_adds_nothing_to_the_test_root() {
    let root = common::setup_test_root(&["alpha", "beta"]);
    let before = root_entries(root.path());
    let cases = common::discover(root.path());
    let mut renderer = RecordingRenderer::default();

    run_scheduler(
        &cases,
        Arc::new(MockBackend::new()),
        Arc::new(ToolchainConfig::default()),
        RunParams::default(),
        &mut renderer,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(clean_all(&cases).is_empty());

    assert_eq!(root_entries(root.path()), before);
    for case in &cases {
        assert_eq!(root_entries(case.dir()), vec!["main.c", "test.json"]);
    }
}

#[test]
fn clean_is_idempotent() {
    let root = common::setup_test_root(&["A"]);
    let case_dir = root.path().join("A");
    fs::create_dir_all(obj_dir(&case_dir)).unwrap();
    fs::write(artifact_path(&case_dir), b"").unwrap();
    fs::write(case_dir.join("log.log"), "old").unwrap();
    let cases = common::discover(root.path());

    assert!(clean_all(&cases).is_empty());
    assert!(clean_all(&cases).is_empty());

    assert!(!artifact_path(&case_dir).exists());
    assert!(!obj_dir(&case_dir).exists());
}

#[test]
fn clean_removes_every_log_file() {
    let root = common::setup_test_root(&["A"]);
    let case_dir = root.path().join("A");
    fs::write(case_dir.join("log.log"), "run").unwrap();
    fs::write(case_dir.join("program.log"), "written by the test itself").unwrap();
    fs::write(case_dir.join("notes.txt"), "keep").unwrap();
    let cases = common::discover(root.path());

    assert!(clean_all(&cases).is_empty());

    assert!(!case_dir.join("log.log").exists());
    assert!(!case_dir.join("program.log").exists());
    assert!(case_dir.join("notes.txt").exists());
}

#[test]
fn clean_only_removes_the_built_executable() {
    let root = common::setup_test_root(&["A"]);
    let case_dir = root.path().join("A");
    fs::write(artifact_path(&case_dir), b"").unwrap();
    fs::write(case_dir.join("helper.exe"), b"checked in").unwrap();
    let cases = common::discover(root.path());

    assert!(clean_all(&cases).is_empty());

    assert!(!artifact_path(&case_dir).exists());
    assert!(case_dir.join("helper.exe").exists());
}

#[test]
fn clean_of_fresh_tree_is_a_no_op() {
    let root = common::setup_test_root(&["A", "B"]);
    let cases = common::discover(root.path());

    assert!(clean_all(&cases).is_empty());
    for case in &cases {
        assert_eq!(case.status(), TestStatus::Stopped);
    }
}

#[test]
fn clean_reports_cases_held_by_a_worker() {
    let root = common::setup_test_root(&["A", "B"]);
    let cases = common::discover(root.path());

    let _held = cases[1].claim().unwrap();
    let failures = clean_all(&cases);

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "B");
}
