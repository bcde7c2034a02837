use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::backend::{Backend, BuildRequest};
use crate::config::ToolchainConfig;
use crate::definition::{load_definition, DEFINITION_FILE};
use crate::discovery::resource_dirs;
use crate::error::CaseError;
use crate::test_log::TestLog;
use crate::types::{CaseSnapshot, TestDefinition, TestStatus};

/// Intermediate build output directory inside each test directory.
pub const OBJ_DIR: &str = "obj";

const ARTIFACT_STEM: &str = "main";

pub fn obj_dir(case_dir: &Path) -> PathBuf {
    case_dir.join(OBJ_DIR)
}

pub fn object_path(case_dir: &Path) -> PathBuf {
    obj_dir(case_dir).join(format!("{}.o", ARTIFACT_STEM))
}

pub fn artifact_path(case_dir: &Path) -> PathBuf {
    case_dir.join(format!("{}{}", ARTIFACT_STEM, std::env::consts::EXE_SUFFIX))
}

/// Remove generated artifacts from `case_dir`: the executable, the `obj`
/// directory, and optionally any `*.log` files.
///
/// Missing artifacts are not an error, so repeated calls are no-ops.
pub fn clean_artifacts(case_dir: &Path, remove_logs: bool) -> Result<(), CaseError> {
    let artifact = artifact_path(case_dir);
    match std::fs::remove_file(&artifact) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(CaseError::io(&artifact, e)),
    }

    if remove_logs {
        let entries = match std::fs::read_dir(case_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CaseError::io(case_dir, e)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
                std::fs::remove_file(&path).map_err(|e| CaseError::io(&path, e))?;
            }
        }
    }

    let obj = obj_dir(case_dir);
    match std::fs::remove_dir_all(&obj) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaseError::io(&obj, e)),
    }
}

// --- TestCase ---

#[derive(Debug, Default)]
struct CaseState {
    status: TestStatus,
    /// Set by a successful load; its presence is what makes the case valid.
    definition: Option<TestDefinition>,
    started_at: Option<Instant>,
    duration: Option<Duration>,
}

/// One discovered test directory.
///
/// Shared between the scheduler (which reads snapshots for the dashboard) and
/// at most one worker (which holds the `CaseWriter` claim). All mutation goes
/// through the writer; the per-case mutex only guards the memory, it never
/// arbitrates between writers.
#[derive(Debug)]
pub struct TestCase {
    dir: PathBuf,
    dir_name: String,
    claimed: AtomicBool,
    state: Mutex<CaseState>,
}

impl TestCase {
    pub fn new(dir: PathBuf) -> Self {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self {
            dir,
            dir_name,
            claimed: AtomicBool::new(false),
            state: Mutex::new(CaseState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn status(&self) -> TestStatus {
        self.lock().status
    }

    pub fn is_valid(&self) -> bool {
        self.lock().definition.is_some()
    }

    /// Display name: the definition's `name` once loaded, else the directory name.
    pub fn name(&self) -> String {
        self.lock()
            .definition
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| self.dir_name.clone())
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        let state = self.lock();
        let elapsed = match (state.duration, state.started_at) {
            (Some(frozen), _) => frozen,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        };
        let name = state
            .definition
            .as_ref()
            .map(|d| d.name.as_str())
            .unwrap_or(&self.dir_name);
        CaseSnapshot::new(name, state.status, elapsed)
    }

    /// Take exclusive mutation rights. Fails if another writer holds them.
    pub fn claim(self: &Arc<Self>) -> Result<CaseWriter, CaseError> {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaseError::AlreadyClaimed(self.dir_name.clone()));
        }
        Ok(CaseWriter {
            case: Arc::clone(self),
        })
    }

    /// Remove all artifacts (logs included) and reset to `STOPPED`.
    pub fn clean(self: &Arc<Self>) -> Result<(), CaseError> {
        self.claim()?.clean(true)
    }

    fn lock(&self) -> MutexGuard<'_, CaseState> {
        // Updates are plain field stores, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// --- CaseWriter ---

/// Exclusive mutation rights over one `TestCase`, released on drop.
///
/// If dropped while the case is still active (a worker panicked or was
/// aborted), the case is demoted to `ERROR` with its duration frozen.
#[must_use = "the claim is released when CaseWriter is dropped"]
pub struct CaseWriter {
    case: Arc<TestCase>,
}

impl std::fmt::Debug for CaseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseWriter")
            .field("dir", &self.case.dir)
            .finish()
    }
}

impl CaseWriter {
    pub fn case(&self) -> &TestCase {
        &self.case
    }

    /// Move the case forward along the state machine.
    ///
    /// The first active status stamps the start time; a terminal status
    /// freezes the duration.
    pub fn transition(&self, to: TestStatus) -> Result<(), CaseError> {
        let mut state = self.case.lock();
        if !state.status.is_valid_transition(&to) {
            return Err(CaseError::InvalidTransition {
                from: state.status,
                to,
            });
        }

        if state.started_at.is_none() && to.is_active() {
            state.started_at = Some(Instant::now());
        }
        if to.is_terminal() {
            state.duration = Some(
                state
                    .started_at
                    .map(|started| started.elapsed())
                    .unwrap_or_default(),
            );
        }
        state.status = to;
        Ok(())
    }

    /// Locate and validate the definition. On success the case becomes valid;
    /// on failure it stays at `LOADING` and the caller settles it at `ERROR`.
    /// Errors are returned, not logged; the worker records them.
    pub fn load(&self, log: &mut TestLog) -> Result<TestDefinition, CaseError> {
        log.line("CLEANING OLD TEST...");
        clean_artifacts(self.case.dir(), false)?;

        log.line("LOADING TEST...");
        if self.case.status() == TestStatus::Stopped {
            self.transition(TestStatus::Loading)?;
        }

        let definition = load_definition(self.case.dir())?;
        self.case.lock().definition = Some(definition.clone());
        log.line(&format!("LOADED TEST '{}' ({})", definition.name, DEFINITION_FILE));
        Ok(definition)
    }

    /// Compile the entry point and, only if that succeeds, run it.
    ///
    /// `Ok` means the program exited 0. A rejected compile is `CompileError`,
    /// a non-zero exit is `RuntimeFailure`, and a backend that could not run
    /// at all is `BackendFault`. The caller maps the error to a terminal status.
    pub async fn build_and_run(
        &self,
        backend: &impl Backend,
        toolchain: &ToolchainConfig,
        log: &mut TestLog,
    ) -> Result<(), CaseError> {
        let definition = self.case.lock().definition.clone().ok_or_else(|| {
            CaseError::Internal("build requested before a successful load".to_string())
        })?;

        let case_dir = self.case.dir();
        let obj = obj_dir(case_dir);
        std::fs::create_dir_all(&obj).map_err(|e| CaseError::io(&obj, e))?;

        log.line("COMPILING TEST...");
        self.transition(TestStatus::Compiling)?;

        let request =
            BuildRequest::merge(toolchain, case_dir, &definition, &resource_dirs(case_dir));
        let compiled = backend
            .compile(&request)
            .await
            .map_err(CaseError::BackendFault)?;

        log.line("Executing compiler command(s):");
        log.line(&compiled.commands);
        log.section("COMPILER OUTPUT", &compiled.output);

        if !compiled.success {
            return Err(CaseError::CompileError(format!(
                "{} rejected the source",
                request.compiler
            )));
        }

        self.transition(TestStatus::Running)?;
        log.line("RUNNING EXECUTABLE...");

        let run = backend
            .execute(&request.artifact)
            .await
            .map_err(CaseError::BackendFault)?;
        log.section("PROGRAM OUTPUT", &run.output);

        if run.exit_code != 0 {
            return Err(CaseError::RuntimeFailure(run.exit_code));
        }

        Ok(())
    }

    /// Delete this test's artifacts and reset status, validity and timing.
    pub fn clean(&self, remove_logs: bool) -> Result<(), CaseError> {
        clean_artifacts(self.case.dir(), remove_logs)?;
        let mut state = self.case.lock();
        state.status = TestStatus::Stopped;
        state.definition = None;
        state.started_at = None;
        state.duration = None;
        Ok(())
    }
}

impl Drop for CaseWriter {
    fn drop(&mut self) {
        if self.case.status().is_active() {
            let _ = self.transition(TestStatus::Error);
        }
        self.case.claimed.store(false, Ordering::Release);
    }
}
