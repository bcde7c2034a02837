#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use testdeck::dashboard::StatusRenderer;
use testdeck::discovery::discover_tests;
use testdeck::test_case::TestCase;
use testdeck::types::{CaseSnapshot, TestStatus};

/// Returns a minimal valid `test.json` body for a test named `name`.
pub fn definition_json(name: &str) -> String {
    format!(
        r#"{{
    "name": "{}",
    "includedirs": [],
    "linkdirs": [],
    "links": [],
    "defines": []
}}"#,
        name
    )
}

/// Creates `<root>/<dir_name>/` with a `main.c` and, when `definition` is
/// given, a `test.json` with that exact content.
///
/// Returns the test directory path.
pub fn write_test_dir(root: &Path, dir_name: &str, definition: Option<&str>) -> PathBuf {
    let dir = root.join(dir_name);
    fs::create_dir_all(&dir).expect("Failed to create test dir");
    fs::write(dir.join("main.c"), "int main(void) { return 0; }\n")
        .expect("Failed to write main.c");
    if let Some(body) = definition {
        fs::write(dir.join("test.json"), body).expect("Failed to write test.json");
    }
    dir
}

/// Creates a temp test root holding one valid test per name, in that order.
///
/// Names are chosen by callers so that sorted discovery order matches the
/// order given here.
pub fn setup_test_root(names: &[&str]) -> TempDir {
    let root = TempDir::new().expect("Failed to create temp dir");
    for name in names {
        write_test_dir(root.path(), name, Some(&definition_json(name)));
    }
    root
}

/// Discover every case under `root`, panicking on I/O failure.
pub fn discover(root: &Path) -> Vec<Arc<TestCase>> {
    discover_tests(root).expect("discovery failed")
}

/// Reads `<case_dir>/log.log`, or an empty string when missing.
pub fn read_log(case_dir: &Path) -> String {
    fs::read_to_string(case_dir.join("log.log")).unwrap_or_default()
}

/// A renderer that keeps every snapshot it is handed.
#[derive(Default)]
pub struct RecordingRenderer {
    pub acquired: bool,
    pub restored: usize,
    pub frames: Vec<Vec<CaseSnapshot>>,
    pub final_frame: Option<Vec<CaseSnapshot>>,
}

impl RecordingRenderer {
    /// Largest number of simultaneously active cases seen in any frame.
    pub fn peak_active(&self) -> usize {
        self.frames
            .iter()
            .map(|frame| frame.iter().filter(|c| c.status.is_active()).count())
            .max()
            .unwrap_or(0)
    }

    /// Every status observed for the case named `name`, consecutive
    /// duplicates collapsed.
    pub fn status_history(&self, name: &str) -> Vec<TestStatus> {
        let mut history: Vec<TestStatus> = Vec::new();
        for frame in self.frames.iter().chain(self.final_frame.iter()) {
            if let Some(case) = frame.iter().find(|c| c.name == name) {
                if history.last() != Some(&case.status) {
                    history.push(case.status);
                }
            }
        }
        history
    }
}

impl StatusRenderer for RecordingRenderer {
    fn acquire(&mut self) -> io::Result<()> {
        self.acquired = true;
        Ok(())
    }

    fn render(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        self.frames.push(snapshot.to_vec());
        Ok(())
    }

    fn finish(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        self.final_frame = Some(snapshot.to_vec());
        Ok(())
    }

    fn restore(&mut self) {
        self.restored += 1;
    }
}
