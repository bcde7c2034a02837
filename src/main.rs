use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use testdeck::backend::CcBackend;
use testdeck::config;
use testdeck::dashboard::Dashboard;
use testdeck::discovery::discover_tests;
use testdeck::log::parse_log_level;
use testdeck::process::{install_signal_handlers, is_shutdown_requested, kill_all_children};
use testdeck::scheduler::{self, HaltReason, RunParams};
use testdeck::{log_debug, log_info, log_warn};

/// Exit status after an interrupt, matching a shell's 128 + SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    name = "testdeck",
    about = "Build and run a directory of C tests in parallel with a live dashboard"
)]
struct Cli {
    /// Number of tests to run at once (defaults to execution.max_concurrent, 4)
    #[arg(short, long)]
    threads: Option<u32>,

    /// Directory containing one subdirectory per test
    #[arg(short, long, default_value = "./tests")]
    input: PathBuf,

    /// Remove every test's obj folder, executable and logs, then exit
    #[arg(short, long)]
    clean: bool,

    /// Path to config file (defaults to ./testdeck.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => testdeck::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let result = if cli.clean {
        handle_clean(&cli.input)
    } else {
        handle_run(&cli.input, cli.config.as_deref(), cli.threads).await
    };

    match result {
        Ok(HaltReason::AllFinished) => {}
        Ok(HaltReason::ShutdownRequested) => std::process::exit(INTERRUPTED_EXIT_CODE),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn handle_clean(input: &Path) -> Result<HaltReason, String> {
    let cases = discover_tests(input)?;

    log_info!("Cleaning {} test(s) in {}", cases.len(), input.display());
    let failures = scheduler::clean_all(&cases);
    for (name, err) in &failures {
        log_warn!("Warning: failed to clean {}: {}", name, err);
    }

    if failures.is_empty() {
        Ok(HaltReason::AllFinished)
    } else {
        Err(format!("{} test(s) could not be cleaned", failures.len()))
    }
}

async fn handle_run(
    input: &Path,
    config_path: Option<&Path>,
    threads: Option<u32>,
) -> Result<HaltReason, String> {
    install_signal_handlers()?;

    let config = config::load_config_from(config_path, Path::new("."))?;
    let max_concurrent = threads.unwrap_or(config.execution.max_concurrent);
    if max_concurrent < 1 {
        return Err("--threads must be >= 1".to_string());
    }

    let cases = discover_tests(input)?;
    if cases.is_empty() {
        log_warn!("No tests found in {}", input.display());
        return Ok(HaltReason::AllFinished);
    }

    log_debug!(
        "Discovered {} test(s); running {} at a time with {}",
        cases.len(),
        max_concurrent,
        config.toolchain.compiler
    );

    // Signal handlers only set a flag; this turns it into a cancellation.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        loop {
            if is_shutdown_requested() {
                cancel_clone.cancel();
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let params = RunParams {
        max_concurrent: max_concurrent as usize,
        refresh_interval: Duration::from_millis(config.execution.refresh_interval_ms),
    };

    let mut dashboard = Dashboard::new(std::io::stdout());
    let summary = scheduler::run_scheduler(
        &cases,
        Arc::new(CcBackend),
        Arc::new(config.toolchain),
        params,
        &mut dashboard,
        cancel,
    )
    .await?;

    if summary.halt_reason == HaltReason::ShutdownRequested {
        kill_all_children();
        log_warn!("Interrupted; {} test(s) not run", summary.not_run);
    }

    // Outcomes are shown, not aggregated into the exit status.
    log_info!(
        "{} ok, {} failed, {} error(s). Logs: {}/*/log.log",
        summary.ok,
        summary.failed,
        summary.errored,
        input.display()
    );

    Ok(summary.halt_reason)
}
