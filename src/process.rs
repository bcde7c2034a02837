use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use nix::unistd::Pid;

/// Maximum time to wait for a child group to exit after SIGTERM before SIGKILL.
const SIGTERM_GRACE_PERIOD_MS: u64 = 2000;

/// Polling interval when waiting for process groups to exit after SIGTERM.
const KILL_POLL_INTERVAL_MS: u64 = 50;

/// Global interrupt flag shared with signal handlers.
fn shutdown_flag() -> &'static Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// Check if an interrupt has been requested via signal.
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Install handlers for SIGTERM and SIGINT that set the interrupt flag.
///
/// Call once at program startup. Subsequent calls re-register the handlers.
pub fn install_signal_handlers() -> Result<(), String> {
    let flag = Arc::clone(shutdown_flag());
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .map_err(|e| format!("Failed to register SIGTERM handler: {}", e))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag)
        .map_err(|e| format!("Failed to register SIGINT handler: {}", e))?;
    Ok(())
}

// --- Child registry ---

/// Process groups of compilers and test executables currently running.
///
/// A plain `std::sync::Mutex`: every operation is a set insert/remove/copy.
fn child_registry() -> &'static Mutex<HashSet<Pid>> {
    static REGISTRY: OnceLock<Mutex<HashSet<Pid>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

pub fn register_child(pgid: Pid) {
    if let Ok(mut registry) = child_registry().lock() {
        registry.insert(pgid);
    }
}

pub fn unregister_child(pgid: Pid) {
    if let Ok(mut registry) = child_registry().lock() {
        registry.remove(&pgid);
    }
}

/// Kill every registered child process group.
///
/// Sends SIGTERM, waits up to the grace period, then SIGKILLs survivors and
/// clears the registry. Only used on interrupt; a normal run never kills a
/// child, however long it takes.
pub fn kill_all_children() {
    use nix::sys::signal::{killpg, Signal};

    let pgids: Vec<Pid> = {
        let Ok(registry) = child_registry().lock() else {
            return;
        };
        registry.iter().copied().collect()
    };

    if pgids.is_empty() {
        return;
    }

    for &pgid in &pgids {
        let _ = killpg(pgid, Signal::SIGTERM);
    }

    let deadline = std::time::Instant::now() + Duration::from_millis(SIGTERM_GRACE_PERIOD_MS);
    let poll_interval = Duration::from_millis(KILL_POLL_INTERVAL_MS);

    while std::time::Instant::now() < deadline {
        let all_gone = pgids
            .iter()
            .all(|&pgid| matches!(killpg(pgid, None), Err(nix::errno::Errno::ESRCH)));
        if all_gone {
            break;
        }
        std::thread::sleep(poll_interval);
    }

    for &pgid in &pgids {
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    if let Ok(mut registry) = child_registry().lock() {
        registry.clear();
    }
}

/// Run `cmd` in its own process group with stdin closed and both output
/// streams captured, registering the group while it runs.
///
/// Returns the exit code and the combined stdout/stderr text. A child killed
/// by a signal reports `128 + signal`, the shell convention.
pub async fn run_captured(mut cmd: tokio::process::Command) -> Result<(i32, String), String> {
    use std::os::unix::process::ExitStatusExt;

    // stdin MUST be null: the child sits in a background process group and a
    // terminal read would stop it with SIGTTIN.
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    // SAFETY: pre_exec runs between fork() and exec() where only
    // async-signal-safe functions are permitted. setpgid is one.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| format!("Failed to spawn {:?}: {}", cmd.as_std().get_program(), e))?;

    let pgid = child.id().map(|id| Pid::from_raw(id as i32));
    if let Some(pgid) = pgid {
        register_child(pgid);
    }

    let waited = child.wait_with_output().await;

    if let Some(pgid) = pgid {
        unregister_child(pgid);
    }

    let output = waited.map_err(|e| format!("Error waiting for subprocess: {}", e))?;

    let code = match (output.status.code(), output.status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok((code, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captured_reports_exit_code_and_output() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 42"]);

        let (code, text) = run_captured(cmd).await.unwrap();
        assert_eq!(code, 42);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn run_captured_maps_signals_to_shell_codes() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "kill -TERM $$"]);

        let (code, _) = run_captured(cmd).await.unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[tokio::test]
    async fn run_captured_spawn_failure_is_an_error() {
        let cmd = tokio::process::Command::new("/nonexistent/testdeck-binary");

        let err = run_captured(cmd).await.unwrap_err();
        assert!(err.contains("Failed to spawn"), "unexpected error: {}", err);
    }
}
