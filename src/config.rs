//! Profiler configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration. CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ProfilerError, Result};
use crate::registry::InputPayload;

/// Flag the profiler binary accepts to act as a spawn-mode interpreter
pub const INVOKE_FLAG: &str = "--invoke";

/// How attach mode decides the collector is observing the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// Poll the target's `TracerPid` until the collector has attached
    Probe,
    /// Sleep a fixed settle delay; may miss early syscalls on slow systems
    Settle,
}

/// Configuration for a profiling run
///
/// # Example
/// ```
/// use syscost::config::{ProfilerConfig, Readiness};
///
/// let config = ProfilerConfig::default();
/// assert_eq!(config.collector, "strace");
/// assert_eq!(config.readiness, Readiness::Probe);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerConfig {
    /// Collector program, looked up on `PATH`
    pub collector: String,

    /// Spawn-mode interpreter command; empty means this binary with `--invoke`
    pub interpreter: Vec<String>,

    /// Root directory walked for workload units
    pub benchmarks_root: PathBuf,

    /// Directory receiving trace artifacts
    pub output_dir: PathBuf,

    /// Directory for ephemeral invocation scripts; `None` uses the OS temp dir
    pub script_dir: Option<PathBuf>,

    /// Workload profiled when none is named on the command line
    pub workload: String,

    pub readiness: Readiness,

    /// Fixed delay used by `Readiness::Settle`
    pub settle_delay_ms: u64,

    /// Upper bound on waiting for the collector to attach under `Readiness::Probe`
    pub attach_deadline_ms: u64,

    /// Bound on waiting for the collector to exit after SIGINT
    pub stop_timeout_ms: u64,

    /// Wall-clock bound on each spawn-mode run
    pub spawn_timeout_secs: u64,

    /// Per-workload input overrides, merged over the built-in table
    pub inputs: BTreeMap<String, InputPayload>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            collector: "strace".to_string(),
            interpreter: Vec::new(),
            benchmarks_root: PathBuf::from("benchmarks"),
            output_dir: PathBuf::from("."),
            script_dir: None,
            workload: "110.dynamic-html".to_string(),
            readiness: Readiness::Probe,
            settle_delay_ms: 1000,
            attach_deadline_ms: 5000,
            stop_timeout_ms: 10_000,
            spawn_timeout_secs: 60,
            inputs: BTreeMap::new(),
        }
    }
}

impl ProfilerConfig {
    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProfilerError::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ProfilerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.collector.trim().is_empty() {
            return Err(ProfilerError::Config(
                "collector must not be empty".to_string(),
            ));
        }

        if self.interpreter.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(ProfilerError::Config(
                "interpreter program must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("attach_deadline_ms", self.attach_deadline_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("spawn_timeout_secs", self.spawn_timeout_secs),
        ] {
            if value == 0 {
                return Err(ProfilerError::Config(format!("{} must be > 0", name)));
            }
        }

        for (name, input) in &self.inputs {
            input
                .validate()
                .map_err(|e| ProfilerError::Config(format!("inputs.{}: {}", name, e)))?;
        }

        Ok(())
    }

    /// Interpreter command for spawn-mode runs
    pub fn interpreter_command(&self) -> Result<Vec<String>> {
        if !self.interpreter.is_empty() {
            return Ok(self.interpreter.clone());
        }
        let exe = std::env::current_exe().map_err(|e| ProfilerError::io("current_exe", e))?;
        Ok(vec![exe.display().to_string(), INVOKE_FLAG.to_string()])
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn attach_deadline(&self) -> Duration {
        Duration::from_millis(self.attach_deadline_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_secs(self.spawn_timeout_secs)
    }
}
