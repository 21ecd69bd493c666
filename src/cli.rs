//! CLI argument parsing for syscost

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{ProfilerConfig, Readiness};

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "syscost")]
#[command(version)]
#[command(
    about = "Measure the syscall cost of dynamically loaded workloads, in-process and from a cold start",
    long_about = None
)]
pub struct Cli {
    /// Workload to profile (exact name or substring, e.g. "thumbnailer")
    #[arg(short = 'w', long = "workload", value_name = "NAME")]
    pub workload: Option<String>,

    /// Root directory holding <category>/<name>/<runtime>/function.so units
    #[arg(short = 'b', long = "benchmarks", value_name = "DIR")]
    pub benchmarks: Option<PathBuf>,

    /// Directory receiving trace artifacts
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Collector program (default: strace)
    #[arg(long = "collector", value_name = "PROG")]
    pub collector: Option<String>,

    /// Wall-clock bound on each spawn-mode run, in seconds
    #[arg(long = "spawn-timeout", value_name = "SECS")]
    pub spawn_timeout: Option<u64>,

    /// How attach mode waits for the collector to attach
    #[arg(long = "readiness", value_enum)]
    pub readiness: Option<Readiness>,

    /// Fixed delay used with --readiness settle
    #[arg(long = "settle-delay-ms", value_name = "MS")]
    pub settle_delay_ms: Option<u64>,

    /// TOML configuration file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// List discovered workloads and exit
    #[arg(long = "list")]
    pub list: bool,

    /// Enable debug tracing output on stderr
    #[arg(long = "debug")]
    pub debug: bool,

    /// Run an invocation script and print its result (spawn-mode interpreter)
    #[arg(long = "invoke", value_name = "SCRIPT", hide = true)]
    pub invoke: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_to(&self, config: &mut ProfilerConfig) {
        if let Some(benchmarks) = &self.benchmarks {
            config.benchmarks_root = benchmarks.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(collector) = &self.collector {
            config.collector = collector.clone();
        }
        if let Some(secs) = self.spawn_timeout {
            config.spawn_timeout_secs = secs;
        }
        if let Some(readiness) = self.readiness {
            config.readiness = readiness;
        }
        if let Some(ms) = self.settle_delay_ms {
            config.settle_delay_ms = ms;
        }
        if let Some(workload) = &self.workload {
            config.workload = workload.clone();
        }
    }
}
