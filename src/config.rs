use std::path::Path;

use serde::Deserialize;

pub const CONFIG_FILE: &str = "testdeck.toml";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TestdeckConfig {
    pub execution: ExecutionConfig,
    pub toolchain: ToolchainConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on simultaneously active test workers.
    pub max_concurrent: u32,
    /// How often the dashboard refreshes elapsed times while workers run.
    pub refresh_interval_ms: u64,
}

/// Defaults applied to every test before its own definition is merged in.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub compiler: String,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub include_dirs: Vec<String>,
    pub library_dirs: Vec<String>,
    /// Source file, relative to the test directory, holding `main`.
    pub entry_point: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            refresh_interval_ms: 100,
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "cc".to_string(),
            compile_flags: vec!["-g".to_string()],
            link_flags: vec![],
            include_dirs: vec![],
            library_dirs: vec![],
            entry_point: "main.c".to_string(),
        }
    }
}

pub fn validate(config: &TestdeckConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.execution.max_concurrent < 1 {
        errors.push("execution.max_concurrent must be >= 1".to_string());
    }

    if config.execution.refresh_interval_ms < 10 {
        errors.push("execution.refresh_interval_ms must be >= 10".to_string());
    }

    if config.toolchain.compiler.trim().is_empty() {
        errors.push("toolchain.compiler must not be empty".to_string());
    }

    if config.toolchain.entry_point.trim().is_empty() {
        errors.push("toolchain.entry_point must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load `testdeck.toml` from `project_root`, falling back to defaults when absent.
pub fn load_config(project_root: &Path) -> Result<TestdeckConfig, String> {
    load_config_from(None, project_root)
}

/// Load from an explicit path when given; otherwise from `project_root`.
///
/// An explicit path must exist. The implicit one is optional.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<TestdeckConfig, String> {
    let path = match config_path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()));
            }
            p.to_path_buf()
        }
        None => {
            let p = project_root.join(CONFIG_FILE);
            if !p.exists() {
                return Ok(TestdeckConfig::default());
            }
            p
        }
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let config: TestdeckConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}
