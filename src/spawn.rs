//! Spawn-mode profiling
//!
//! Traces a fresh interpreter process from its first instruction so that
//! runtime start-up is measured along with the workload. The interpreter
//! reads an ephemeral invocation script, invokes the handler and prints the
//! result as one JSON line (or `ERROR: <message>` with exit status 1).

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::collector::{artifact_path, CollectorCommand, Granularity, TraceMode};
use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use crate::loader::Loader;
use crate::process;
use crate::reconcile::{
    reconcile, ExecutionOutcome, ObservationWindow, ProfileMode, ProfileResult, SessionClosure,
};
use crate::registry::{InputPayload, WorkloadUnit};
use crate::session::ensure_artifact;

/// Prefix marking a workload fault on the interpreter's stdout
pub const ERROR_PREFIX: &str = "ERROR:";

/// What the interpreter should load and with which input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationScript {
    pub code_path: PathBuf,
    pub input: InputPayload,
}

impl InvocationScript {
    pub fn new(unit: &WorkloadUnit, input: &InputPayload) -> Self {
        Self {
            code_path: unit.code_path.clone(),
            input: input.clone(),
        }
    }

    /// Write the script to a temporary file that is removed when dropped
    pub fn write_ephemeral(&self, dir: Option<&Path>) -> Result<NamedTempFile> {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let mut file = tempfile::Builder::new()
            .prefix("syscost_invoke_")
            .suffix(".json")
            .tempfile_in(&dir)
            .map_err(|e| ProfilerError::io(&dir, e))?;

        serde_json::to_writer(file.as_file_mut(), self)?;
        file.as_file_mut()
            .flush()
            .map_err(|e| ProfilerError::io(file.path(), e))?;
        Ok(file)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProfilerError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Interpreter side: run a script and report on `out`, returning the exit code
pub fn interpret(script_path: &Path, loader: &dyn Loader, out: &mut dyn Write) -> i32 {
    let result = InvocationScript::read(script_path)
        .map_err(|e| e.to_string())
        .and_then(|script| {
            loader
                .load_and_invoke(&script.code_path, &script.input)
                .map_err(|fault| fault.to_string())
        });

    // Handler output buffered in C stdio must not trail the result line
    unsafe {
        libc::fflush(std::ptr::null_mut());
    }

    let (line, code) = match result {
        Ok(value) => (value.to_string(), 0),
        Err(message) => (format!("{} {}", ERROR_PREFIX, message), 1),
    };
    if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
        return 1;
    }
    code
}

/// Captured result of one collector run
#[derive(Debug)]
struct RunOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Run a collector command to completion, or kill it at `timeout`
///
/// Returns `None` on timeout.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Option<RunOutput>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    process::isolate(&mut cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| ProfilerError::CollectorUnavailable(format!("failed to start collector: {}", e)))?;
    let stdout = process::drain(child.stdout.take());
    let stderr = process::drain(child.stderr.take());

    let status = process::wait_with_timeout(&mut child, timeout);
    if status.is_none() {
        process::force_terminate(&mut child);
    }
    let stdout = process::collect(stdout);
    let stderr = process::collect(stderr);

    Ok(status.map(|status| RunOutput {
        status,
        stdout,
        stderr,
    }))
}

/// Recover the workload outcome from the interpreter's streams
///
/// Exit 0 decodes the last non-empty stdout line as JSON. Any other exit
/// prefers an `ERROR:` line and otherwise describes the exit.
pub fn outcome_from_output(
    code: Option<i32>,
    signal: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> ExecutionOutcome {
    if code == Some(0) {
        return match stdout.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => match serde_json::from_str(line.trim()) {
                Ok(value) => ExecutionOutcome::Returned(value),
                Err(_) => {
                    ExecutionOutcome::Faulted(format!("unparseable workload output: {}", line.trim()))
                }
            },
            None => ExecutionOutcome::Faulted("workload produced no output".to_string()),
        };
    }

    if let Some(message) = stdout
        .lines()
        .find_map(|line| line.strip_prefix(ERROR_PREFIX))
    {
        return ExecutionOutcome::Faulted(message.trim().to_string());
    }

    let mut message = match (code, signal) {
        (Some(code), _) => format!("process failed with exit code {}", code),
        (None, Some(signal)) => format!("process killed by signal {}", signal),
        (None, None) => "process failed".to_string(),
    };
    if !stderr.trim().is_empty() {
        message.push_str(": ");
        message.push_str(stderr.trim());
    }
    ExecutionOutcome::Faulted(message)
}

fn outcome_from_run(run: &RunOutput) -> ExecutionOutcome {
    use std::os::unix::process::ExitStatusExt;
    outcome_from_output(run.status.code(), run.status.signal(), &run.stdout, &run.stderr)
}

/// Profile a workload in a freshly spawned interpreter, summary then full
///
/// The invocation script is shared by both runs and removed afterwards on
/// every path. Only the first run's output is used for the outcome.
pub fn profile_spawned(
    config: &ProfilerConfig,
    unit: &WorkloadUnit,
    input: &InputPayload,
) -> ProfileResult {
    tracing::info!(
        workload = %unit.name,
        code_path = %unit.code_path.display(),
        input = %input,
        "profiling with a freshly spawned interpreter"
    );

    let script = match InvocationScript::new(unit, input).write_ephemeral(config.script_dir.as_deref())
    {
        Ok(script) => script,
        Err(e) => return ProfileResult::failed(&unit.name, ProfileMode::Spawn, input, e),
    };

    let result = match run_spawn_session(config, unit, input, script.path()) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(workload = %unit.name, "spawn-mode profiling failed: {}", e);
            ProfileResult::failed(&unit.name, ProfileMode::Spawn, input, e)
        }
    };

    if let Err(e) = script.close() {
        tracing::warn!("failed to remove invocation script: {}", e);
    }
    result
}

fn run_spawn_session(
    config: &ProfilerConfig,
    unit: &WorkloadUnit,
    input: &InputPayload,
    script_path: &Path,
) -> Result<ProfileResult> {
    let interpreter = config.interpreter_command()?;
    let timeout = config.spawn_timeout();
    let window = ObservationWindow::open();
    let mut closure = SessionClosure::default();
    let mut first: Option<RunOutput> = None;

    for granularity in [Granularity::Summary, Granularity::Full] {
        let artifact = artifact_path(&config.output_dir, TraceMode::Spawn, granularity, &unit.name);
        let collector = CollectorCommand::new(config.collector.as_str(), granularity, &artifact);
        tracing::debug!(
            args = ?collector.spawn_args(&interpreter, script_path),
            "starting collector"
        );

        let run = run_with_timeout(collector.spawn(&interpreter, script_path), timeout)?;
        let Some(run) = run else {
            tracing::warn!(
                workload = %unit.name,
                granularity = %granularity,
                ?timeout,
                "spawn-mode run timed out"
            );
            if artifact.exists() {
                closure.artifact_paths.push(artifact);
            }
            closure.window = Some(window.close());
            let mut result = reconcile(
                &unit.name,
                ProfileMode::Spawn,
                input,
                closure,
                ExecutionOutcome::TimedOut,
            );
            result.error = Some(format!(
                "spawn-mode execution timed out after {} s",
                timeout.as_secs()
            ));
            return Ok(result);
        };

        ensure_artifact(&artifact)?;
        tracing::info!(artifact = %artifact.display(), status = %run.status, "spawn-mode run finished");
        closure.artifact_paths.push(artifact);
        if first.is_none() {
            first = Some(run);
        }
    }

    closure.window = Some(window.close());
    let outcome = match first {
        Some(run) => {
            let outcome = outcome_from_run(&run);
            closure.stdout = run.stdout;
            closure.stderr = run.stderr;
            outcome
        }
        None => ExecutionOutcome::Faulted("no spawn-mode run completed".to_string()),
    };

    Ok(reconcile(&unit.name, ProfileMode::Spawn, input, closure, outcome))
}
