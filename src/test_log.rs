use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::CaseError;

pub const LOG_FILE: &str = "log.log";

/// The narrative log of one test run, owned by the worker running that test.
///
/// The file is truncated when created, so each run starts a fresh log.
/// Writes never fail from the caller's point of view: the first I/O error is
/// held and reported by `finish`.
///
/// Format:
/// ```text
/// ========== BEGINNING OF LOG FILE ==========
/// Started: {rfc3339}
/// CLEANING OLD TEST...
/// LOADING TEST...
/// ...
/// TEST RESULT -> {status}
/// ```
pub struct TestLog {
    path: PathBuf,
    writer: BufWriter<File>,
    error: Option<std::io::Error>,
}

impl std::fmt::Debug for TestLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestLog").field("path", &self.path).finish()
    }
}

impl TestLog {
    /// Create (or truncate) the log in `case_dir` and write the header.
    pub fn create(case_dir: &Path) -> Result<Self, CaseError> {
        let path = case_dir.join(LOG_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| CaseError::io(&path, e))?;

        let mut log = Self {
            path,
            writer: BufWriter::new(file),
            error: None,
        };
        log.line("========== BEGINNING OF LOG FILE ==========");
        log.line(&format!("Started: {}", chrono::Local::now().to_rfc3339()));
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line of narrative.
    pub fn line(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.writer, "{}", text) {
            self.error = Some(e);
        }
    }

    /// Append captured tool output between start/end banners.
    pub fn section(&mut self, title: &str, body: &str) {
        self.line("");
        self.line(&format!("============ START OF {} ============", title));
        let body = body.strip_suffix('\n').unwrap_or(body);
        if !body.is_empty() {
            self.line(body);
        }
        self.line(&format!("============ END OF {} ============", title));
    }

    /// Flush to disk, surfacing the first write error if one occurred.
    pub fn finish(mut self) -> Result<(), CaseError> {
        if let Some(e) = self.error.take() {
            return Err(CaseError::io(&self.path, e));
        }
        self.writer
            .flush()
            .map_err(|e| CaseError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_truncates_previous_log() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LOG_FILE), "stale contents from last run\n").unwrap();

        let log = TestLog::create(dir.path()).unwrap();
        log.finish().unwrap();

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(!contents.contains("stale contents"));
        assert!(contents.starts_with("========== BEGINNING OF LOG FILE =========="));
    }

    #[test]
    fn section_wraps_body_in_banners() {
        let dir = TempDir::new().unwrap();
        let mut log = TestLog::create(dir.path()).unwrap();
        log.section("CC OUTPUT", "warning: unused variable\n");
        log.finish().unwrap();

        let contents = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        let start = contents.find("START OF CC OUTPUT").unwrap();
        let body = contents.find("warning: unused variable").unwrap();
        let end = contents.find("END OF CC OUTPUT").unwrap();
        assert!(start < body && body < end);
    }

    #[test]
    fn create_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = TestLog::create(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, CaseError::Io { .. }));
    }
}
