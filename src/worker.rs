use crate::backend::Backend;
use crate::config::ToolchainConfig;
use crate::error::CaseError;
use crate::test_case::CaseWriter;
use crate::test_log::TestLog;
use crate::types::TestStatus;

/// Run one test case's full lifecycle: load, build, run.
///
/// Every failure is recorded in the test's log and collapsed into a terminal
/// status, which is returned by value. Nothing here writes to the terminal.
/// The claim is released when this returns.
pub async fn run_case(
    writer: CaseWriter,
    backend: &impl Backend,
    toolchain: &ToolchainConfig,
) -> TestStatus {
    if writer.transition(TestStatus::Loading).is_err() {
        // Not STOPPED: this case already ran and was never cleaned.
        return writer.case().status();
    }

    let mut log = match TestLog::create(writer.case().dir()) {
        Ok(log) => log,
        Err(_) => {
            let _ = writer.transition(TestStatus::Error);
            return TestStatus::Error;
        }
    };

    let result = run_lifecycle(&writer, backend, toolchain, &mut log).await;
    let status = settle(&writer, result, &mut log);

    // A failed flush has nowhere left to be reported.
    let _ = log.finish();
    status
}

async fn run_lifecycle(
    writer: &CaseWriter,
    backend: &impl Backend,
    toolchain: &ToolchainConfig,
    log: &mut TestLog,
) -> Result<(), CaseError> {
    writer.load(log)?;
    writer.build_and_run(backend, toolchain, log).await
}

/// Move the case to its terminal status and write the result line.
fn settle(writer: &CaseWriter, result: Result<(), CaseError>, log: &mut TestLog) -> TestStatus {
    let target = match result {
        Ok(()) => TestStatus::Ok,
        Err(e) => {
            log.line(&e.to_string());
            e.terminal_status()
        }
    };

    if let Err(e) = writer.transition(target) {
        log.line(&e.to_string());
        let _ = writer.transition(TestStatus::Error);
    }

    let status = writer.case().status();
    log.line(&format!("TEST RESULT -> {}", status));
    status
}
