use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::test_case::TestCase;

/// Reserved directory for shared files. Never a test, at either level.
pub const RESOURCES_DIR: &str = "resources";

/// Discover one test case per immediate subdirectory of `root`.
///
/// Only `resources` is skipped. Results are sorted by path so the dashboard
/// order is stable across runs and platforms.
pub fn discover_tests(root: &Path) -> Result<Vec<Arc<TestCase>>, String> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| format!("Failed to read test directory {}: {}", root.display(), e))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| format!("Failed to read entry in {}: {}", root.display(), e))?;
        let path = entry.path();
        if path.is_dir() && is_test_dir_name(&entry.file_name().to_string_lossy()) {
            dirs.push(path);
        }
    }
    dirs.sort();

    Ok(dirs
        .into_iter()
        .map(|dir| Arc::new(TestCase::new(dir)))
        .collect())
}

fn is_test_dir_name(name: &str) -> bool {
    name != RESOURCES_DIR
}

/// Extra include directories for a test: the shared `resources` directory
/// beside it and its own `resources` directory, whichever exist.
pub fn resource_dirs(case_dir: &Path) -> Vec<PathBuf> {
    let shared = case_dir.parent().map(|root| root.join(RESOURCES_DIR));
    let own = Some(case_dir.join(RESOURCES_DIR));

    [shared, own]
        .into_iter()
        .flatten()
        .filter(|dir| dir.is_dir())
        .collect()
}
