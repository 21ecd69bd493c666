//! Collector invocation shapes and artifact naming
//!
//! The collector is an external syscall tracer (`strace` by default) run as
//! a subprocess. This module only builds its command lines; the session and
//! spawn modules own the processes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What the collector records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Aggregate counts and timing per syscall (`-c`)
    Summary,
    /// Every individual call
    Full,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Summary => "summary",
            Granularity::Full => "full",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the collector reaches its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Attach to an already-running process by PID
    Attach,
    /// Start a fresh process under the collector
    Spawn,
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceMode::Attach => f.write_str("attach"),
            TraceMode::Spawn => f.write_str("spawn"),
        }
    }
}

/// Artifact file name for a (mode, granularity, workload) triple
///
/// Names are stable for downstream tooling:
/// `attach_{summary|full}_{name}.txt` and `fullpython_{summary|full}_{name}.txt`.
///
/// # Example
/// ```
/// use syscost::collector::{artifact_name, Granularity, TraceMode};
///
/// assert_eq!(
///     artifact_name(TraceMode::Spawn, Granularity::Summary, "010.sleep"),
///     "fullpython_summary_010.sleep.txt"
/// );
/// ```
pub fn artifact_name(mode: TraceMode, granularity: Granularity, workload: &str) -> String {
    let prefix = match mode {
        TraceMode::Attach => "attach",
        TraceMode::Spawn => "fullpython",
    };
    format!("{}_{}_{}.txt", prefix, granularity, workload)
}

/// Artifact path under `output_dir`
pub fn artifact_path(
    output_dir: &Path,
    mode: TraceMode,
    granularity: Granularity,
    workload: &str,
) -> PathBuf {
    output_dir.join(artifact_name(mode, granularity, workload))
}

/// Builder for collector command lines
#[derive(Debug, Clone)]
pub struct CollectorCommand {
    program: String,
    granularity: Granularity,
    output: PathBuf,
}

impl CollectorCommand {
    pub fn new(program: impl Into<String>, granularity: Granularity, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            granularity,
            output: output.into(),
        }
    }

    /// `collector [-c] -p <pid> -o <artifact>`
    pub fn attach_args(&self, pid: u32) -> Vec<String> {
        let mut args = self.granularity_args();
        args.extend(["-p".to_string(), pid.to_string()]);
        args.extend(self.output_args());
        args
    }

    /// `collector [-c] -f -o <artifact> <interpreter...> <script>`
    pub fn spawn_args(&self, interpreter: &[String], script: &Path) -> Vec<String> {
        let mut args = self.granularity_args();
        args.push("-f".to_string());
        args.extend(self.output_args());
        args.extend(interpreter.iter().cloned());
        args.push(script.display().to_string());
        args
    }

    pub fn attach(&self, pid: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.attach_args(pid));
        cmd
    }

    pub fn spawn(&self, interpreter: &[String], script: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.spawn_args(interpreter, script));
        cmd
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn granularity_args(&self) -> Vec<String> {
        match self.granularity {
            Granularity::Summary => vec!["-c".to_string()],
            Granularity::Full => Vec::new(),
        }
    }

    fn output_args(&self) -> [String; 2] {
        ["-o".to_string(), self.output.display().to_string()]
    }
}
