use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ToolchainConfig;
use crate::process::run_captured;
use crate::test_case::{artifact_path, object_path};
use crate::types::TestDefinition;

/// Fully merged compile and link options for one test.
///
/// Global toolchain defaults come first, then the test's own lists, then any
/// `resources` include directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub compiler: String,
    pub source: PathBuf,
    pub object: PathBuf,
    pub artifact: PathBuf,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub include_dirs: Vec<String>,
    pub library_dirs: Vec<String>,
    pub libraries: Vec<String>,
    pub defines: Vec<String>,
}

impl BuildRequest {
    pub fn merge(
        toolchain: &ToolchainConfig,
        case_dir: &Path,
        definition: &TestDefinition,
        resource_dirs: &[PathBuf],
    ) -> Self {
        let mut include_dirs = toolchain.include_dirs.clone();
        include_dirs.extend(definition.includedirs.iter().cloned());
        include_dirs.extend(resource_dirs.iter().map(|d| d.display().to_string()));

        // Test-specific library paths are searched before the global ones.
        let mut library_dirs = definition.linkdirs.clone();
        library_dirs.extend(toolchain.library_dirs.iter().cloned());

        Self {
            compiler: toolchain.compiler.clone(),
            source: case_dir.join(&toolchain.entry_point),
            object: object_path(case_dir),
            artifact: artifact_path(case_dir),
            compile_flags: toolchain.compile_flags.clone(),
            link_flags: toolchain.link_flags.clone(),
            include_dirs,
            library_dirs,
            libraries: definition.links.clone(),
            defines: definition.defines.clone(),
        }
    }

    /// Arguments for the compile step: source to object file.
    pub fn compile_args(&self) -> Vec<String> {
        let mut args = self.compile_flags.clone();
        args.extend(self.include_dirs.iter().map(|d| format!("-I{}", d)));
        args.extend(self.defines.iter().map(|d| format!("-D{}", d)));
        args.push("-c".to_string());
        args.push(self.source.display().to_string());
        args.push("-o".to_string());
        args.push(self.object.display().to_string());
        args
    }

    /// Arguments for the link step: object file to executable.
    pub fn link_args(&self) -> Vec<String> {
        let mut args = vec![
            self.object.display().to_string(),
            "-o".to_string(),
            self.artifact.display().to_string(),
        ];
        args.extend(self.library_dirs.iter().map(|d| format!("-L{}", d)));
        args.extend(self.libraries.iter().map(|l| format!("-l{}", l)));
        args.extend(self.link_flags.iter().cloned());
        args
    }

    /// Directory name of the test this request builds, used to key mocks.
    fn case_name(&self) -> String {
        case_name_of(&self.source)
    }
}

fn case_name_of(path_in_case: &Path) -> String {
    path_in_case
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub success: bool,
    /// Command lines that were run, one per line.
    pub commands: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i32,
    pub output: String,
}

/// The toolchain that turns a test's entry point into an executable and runs it.
///
/// `Err` from either call is a backend fault: the tool could not be started or
/// waited on. A compiler that ran and rejected the source is `Ok` with
/// `success == false`.
pub trait Backend: Send + Sync {
    fn compile(
        &self,
        request: &BuildRequest,
    ) -> impl std::future::Future<Output = Result<CompileOutput, String>> + Send;

    fn execute(
        &self,
        artifact: &Path,
    ) -> impl std::future::Future<Output = Result<RunOutput, String>> + Send;
}

/// Real backend driving a `cc`-compatible compiler driver in two steps.
pub struct CcBackend;

impl Backend for CcBackend {
    async fn compile(&self, request: &BuildRequest) -> Result<CompileOutput, String> {
        let compile_args = request.compile_args();
        let mut commands = format!("{} {}", request.compiler, compile_args.join(" "));

        let mut cmd = tokio::process::Command::new(&request.compiler);
        cmd.args(&compile_args);
        let (code, mut output) = run_captured(cmd).await?;
        if code != 0 {
            return Ok(CompileOutput {
                success: false,
                commands,
                output,
            });
        }

        let link_args = request.link_args();
        commands.push('\n');
        commands.push_str(&format!("{} {}", request.compiler, link_args.join(" ")));

        let mut cmd = tokio::process::Command::new(&request.compiler);
        cmd.args(&link_args);
        let (code, link_output) = run_captured(cmd).await?;
        output.push_str(&link_output);

        Ok(CompileOutput {
            success: code == 0,
            commands,
            output,
        })
    }

    async fn execute(&self, artifact: &Path) -> Result<RunOutput, String> {
        let cmd = tokio::process::Command::new(artifact);
        let (exit_code, output) = run_captured(cmd).await?;
        Ok(RunOutput { exit_code, output })
    }
}

// --- Mock ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCompile {
    Success,
    Failure(String),
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRun {
    Exit(i32),
    Fault(String),
}

/// Scripted behavior for one test directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockScript {
    pub compile: MockCompile,
    pub run: MockRun,
    /// Simulated duration of each backend call.
    pub delay: Duration,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            compile: MockCompile::Success,
            run: MockRun::Exit(0),
            delay: Duration::ZERO,
        }
    }
}

/// Mock backend for scheduler and worker tests.
///
/// Outcomes are scripted per test directory name, since completion order under
/// concurrency is not deterministic. A successful compile touches the object
/// file and artifact so artifact cleanup can be observed.
#[derive(Default)]
pub struct MockBackend {
    scripts: HashMap<String, MockScript>,
    default_script: MockScript,
    compiled: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, case_dir_name: &str, script: MockScript) -> Self {
        self.scripts.insert(case_dir_name.to_string(), script);
        self
    }

    /// Script used for any test without its own entry.
    pub fn with_default(mut self, script: MockScript) -> Self {
        self.default_script = script;
        self
    }

    /// Directory names compile was called for, in call order.
    pub fn compiled(&self) -> Vec<String> {
        self.compiled.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Directory names execute was called for, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Highest number of backend calls observed in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn script_for(&self, case: &str) -> MockScript {
        self.scripts
            .get(case)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone())
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Backend for MockBackend {
    async fn compile(&self, request: &BuildRequest) -> Result<CompileOutput, String> {
        let _guard = self.enter();
        let case = request.case_name();
        if let Ok(mut compiled) = self.compiled.lock() {
            compiled.push(case.clone());
        }

        let script = self.script_for(&case);
        tokio::time::sleep(script.delay).await;

        let commands = format!("mock-cc {}", request.compile_args().join(" "));
        match script.compile {
            MockCompile::Success => {
                for path in [&request.object, &request.artifact] {
                    std::fs::write(path, b"")
                        .map_err(|e| format!("mock could not write {}: {}", path.display(), e))?;
                }
                Ok(CompileOutput {
                    success: true,
                    commands,
                    output: String::new(),
                })
            }
            MockCompile::Failure(output) => Ok(CompileOutput {
                success: false,
                commands,
                output,
            }),
            MockCompile::Fault(message) => Err(message),
        }
    }

    async fn execute(&self, artifact: &Path) -> Result<RunOutput, String> {
        let _guard = self.enter();
        let case = case_name_of(artifact);
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(case.clone());
        }

        let script = self.script_for(&case);
        tokio::time::sleep(script.delay).await;

        match script.run {
            MockRun::Exit(exit_code) => Ok(RunOutput {
                exit_code,
                output: format!("{} exited with {}\n", case, exit_code),
            }),
            MockRun::Fault(message) => Err(message),
        }
    }
}
