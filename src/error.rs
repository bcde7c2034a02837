use std::path::PathBuf;

use crate::types::TestStatus;

/// Everything that can end a test case short of `OK`.
///
/// Categories:
/// - Load: definition missing, unparsable, or failing the schema. Never compiled.
/// - Build: the backend rejected the source.
/// - Run: the artifact exited non-zero.
/// - Fault: anything unexpected, including backend spawn failures and I/O.
///
/// None of these leave the worker as a fault; each one is recorded in the
/// test's log and collapsed into a terminal status.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    // Load
    #[error("MISSING 'test.json' FILE ({})", .0.display())]
    DefinitionMissing(PathBuf),

    #[error("INVALID JSON FILE ({}): {detail}", path.display())]
    DefinitionSyntax { path: PathBuf, detail: String },

    #[error("JSON FILE MISSING ATTRIBUTES -> {field} ({reason})")]
    DefinitionInvalid { field: String, reason: String },

    // Build
    #[error("DETECTED ERROR WHILE COMPILING: {0}")]
    CompileError(String),

    // Run
    #[error("TEST FAILED. RETURN CODE -> {0}")]
    RuntimeFailure(i32),

    // Fault
    #[error("Backend fault: {0}")]
    BackendFault(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TestStatus, to: TestStatus },

    #[error("Test case '{0}' is already claimed by another worker")]
    AlreadyClaimed(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaseError {
    /// Returns true if the error stopped the case before any build attempt.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            CaseError::DefinitionMissing(_)
                | CaseError::DefinitionSyntax { .. }
                | CaseError::DefinitionInvalid { .. }
        )
    }

    /// The terminal status a case ends at when this error stops it.
    pub fn terminal_status(&self) -> TestStatus {
        match self {
            CaseError::RuntimeFailure(_) => TestStatus::Fail,
            _ => TestStatus::Error,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaseError::Io {
            path: path.into(),
            source,
        }
    }
}
