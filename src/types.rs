use std::time::Duration;

use serde::{Deserialize, Serialize};

// --- Enums ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    #[default]
    Stopped,
    Loading,
    Compiling,
    Running,
    Error,
    Fail,
    Ok,
}

impl TestStatus {
    /// Validates whether a transition from this status to `to` is allowed
    /// within a single run.
    ///
    /// Rules:
    /// - Forward progression: Stopped -> Loading -> Compiling -> Running -> Ok | Fail
    /// - Any active status (Loading, Compiling, Running) can drop to Error
    /// - Terminal statuses (Error, Fail, Ok) never transition
    ///
    /// Returning to Stopped is not a transition; only `clean` resets a case.
    pub fn is_valid_transition(&self, to: &TestStatus) -> bool {
        use TestStatus::*;

        if *to == Error && self.is_active() {
            return true;
        }

        matches!(
            (self, to),
            (Stopped, Loading)
                | (Loading, Compiling)
                | (Compiling, Running)
                | (Running, Ok)
                | (Running, Fail)
        )
    }

    /// Loading, Compiling or Running: a worker currently owns the case.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TestStatus::Loading | TestStatus::Compiling | TestStatus::Running
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Error | TestStatus::Fail | TestStatus::Ok)
    }

    pub fn category(&self) -> StatusCategory {
        match self {
            TestStatus::Stopped => StatusCategory::Idle,
            TestStatus::Loading | TestStatus::Compiling | TestStatus::Running => {
                StatusCategory::InProgress
            }
            TestStatus::Error => StatusCategory::Error,
            TestStatus::Fail => StatusCategory::Failed,
            TestStatus::Ok => StatusCategory::Passed,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TestStatus::Stopped => "STOPPED",
            TestStatus::Loading => "LOADING",
            TestStatus::Compiling => "COMPILING",
            TestStatus::Running => "RUNNING",
            TestStatus::Error => "ERROR",
            TestStatus::Fail => "FAIL",
            TestStatus::Ok => "OK",
        };
        f.write_str(label)
    }
}

/// Coarse grouping of statuses used for dashboard coloring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCategory {
    Idle,
    InProgress,
    Error,
    Failed,
    Passed,
}

// --- Structs ---

/// Contents of a test's `test.json` after schema validation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct TestDefinition {
    pub name: String,
    pub includedirs: Vec<String>,
    pub linkdirs: Vec<String>,
    pub links: Vec<String>,
    pub defines: Vec<String>,
}

/// Point-in-time view of a test case, as read by the dashboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseSnapshot {
    pub name: String,
    pub status: TestStatus,
    /// Zero until the case first becomes active; frozen once terminal.
    pub elapsed: Duration,
}

impl CaseSnapshot {
    pub fn new(name: &str, status: TestStatus, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            status,
            elapsed,
        }
    }
}
