//! Sequencing of the three profiling passes for one workload
//!
//! ```text
//! Idle -> ResolvingWorkload -> AttachSummary -> AttachFull -> Spawn -> Reporting -> Idle
//!                 \----------------- unresolved ------------------------/
//! ```
//!
//! Passes never overlap: each runs its own timeout and cleanup handling to
//! completion before the next starts, so no two collectors observe the
//! process at once.

use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::collector::Granularity;
use crate::config::ProfilerConfig;
use crate::loader::Loader;
use crate::reconcile::ProfileResult;
use crate::registry::{Registry, WorkloadUnit};
use crate::report;
use crate::session::profile_attached;
use crate::spawn::profile_spawned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ResolvingWorkload,
    AttachSummary,
    AttachFull,
    Spawn,
    Reporting,
}

/// Everything one orchestrated run produced
#[derive(Debug, Clone)]
pub struct ProfileRun {
    /// `None` when the requested workload could not be resolved
    pub workload: Option<WorkloadUnit>,
    /// Attach summary, attach full, spawn; in that order
    pub results: Vec<ProfileResult>,
}

pub struct Orchestrator<'a> {
    config: &'a ProfilerConfig,
    registry: &'a Registry,
    loader: &'a dyn Loader,
    stage: Stage,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a ProfilerConfig, registry: &'a Registry, loader: &'a dyn Loader) -> Self {
        Self {
            config,
            registry,
            loader,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Profile `query` in all three passes and write the report to `out`
    ///
    /// Individual pass failures are reported, never propagated; only a
    /// failure to write the report is an error.
    pub fn run(
        &mut self,
        query: &str,
        format: OutputFormat,
        out: &mut dyn Write,
    ) -> io::Result<ProfileRun> {
        let text = format == OutputFormat::Text;
        if text {
            report::write_banner(out)?;
        }

        self.enter(Stage::ResolvingWorkload);
        let Some(unit) = self.registry.resolve(query).cloned() else {
            tracing::warn!(query, "workload not found");
            let run = ProfileRun {
                workload: None,
                results: Vec::new(),
            };
            self.report(query, &run, format, out)?;
            return Ok(run);
        };
        let input = self.registry.input_for(&unit.name);
        if text {
            writeln!(out, "Testing with function: {}", unit.name)?;
        }

        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            tracing::warn!(
                dir = %self.config.output_dir.display(),
                "cannot create output directory: {}",
                e
            );
        }

        let mut results = Vec::with_capacity(3);
        for (stage, granularity, heading) in [
            (
                Stage::AttachSummary,
                Granularity::Summary,
                "1a. Profiling with attach mode (summary)...",
            ),
            (
                Stage::AttachFull,
                Granularity::Full,
                "1b. Profiling with attach mode (full)...",
            ),
        ] {
            self.enter(stage);
            if text {
                report::write_stage_heading(out, heading, &unit, &input)?;
            }
            let result = profile_attached(self.config, self.loader, &unit, &input, granularity);
            if text {
                write_progress(out, &result)?;
            }
            results.push(result);
        }

        self.enter(Stage::Spawn);
        if text {
            report::write_stage_heading(out, "2. Profiling with spawn mode...", &unit, &input)?;
        }
        let result = profile_spawned(self.config, &unit, &input);
        if text {
            write_progress(out, &result)?;
        }
        results.push(result);

        let run = ProfileRun {
            workload: Some(unit),
            results,
        };
        self.report(query, &run, format, out)?;
        Ok(run)
    }

    fn report(
        &mut self,
        query: &str,
        run: &ProfileRun,
        format: OutputFormat,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        self.enter(Stage::Reporting);
        let written = match (format, &run.workload) {
            (OutputFormat::Json, workload) => {
                report::write_json(out, workload.as_ref(), &run.results, self.registry.units())
            }
            (OutputFormat::Text, Some(_)) => report::write_results(out, &run.results),
            (OutputFormat::Text, None) => {
                report::write_unresolved(out, query, self.registry.units())
            }
        };
        self.enter(Stage::Idle);
        written
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "orchestrator stage");
        self.stage = stage;
    }
}

fn write_progress(out: &mut dyn Write, result: &ProfileResult) -> io::Result<()> {
    if result.success {
        for path in &result.artifact_paths {
            writeln!(out, "Trace file saved: {}", path.display())?;
        }
    } else if let Some(error) = &result.error {
        writeln!(out, "Profiling failed: {}", error)?;
    }
    Ok(())
}
