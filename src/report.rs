//! Human-readable and JSON reports

use serde::Serialize;
use std::io::{self, Write};

use crate::reconcile::ProfileResult;
use crate::registry::{InputPayload, WorkloadUnit};

/// Workloads listed when the requested one cannot be resolved
pub const AVAILABLE_PREVIEW: usize = 5;

pub fn write_banner(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "=== syscost - Dual Mode Syscall Profiler ===")?;
    writeln!(out, "This tool provides two profiling modes:")?;
    writeln!(
        out,
        "1. Attach: trace this process while it loads and runs the workload (runtime already up)"
    )?;
    writeln!(
        out,
        "2. Spawn: trace a fresh interpreter from its first instruction (runtime start-up + load + run)"
    )?;
    writeln!(out)
}

/// Announce a stage before its observation window opens
pub fn write_stage_heading(
    out: &mut dyn Write,
    heading: &str,
    unit: &WorkloadUnit,
    input: &InputPayload,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", heading)?;
    writeln!(out, "Function path: {}", unit.code_path.display())?;
    writeln!(out, "Input data: {}", input)?;
    out.flush()
}

/// Text summary of the results whose protocol completed
pub fn write_results(out: &mut dyn Write, results: &[ProfileResult]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out)?;
    writeln!(out, "=== Final Results ===")?;

    for result in results.iter().filter(|r| r.success) {
        writeln!(out)?;
        writeln!(out, "{}:", result.mode.label())?;
        let mark = if result.workload_executed() { "✓" } else { "✗" };
        writeln!(out, "  Function executed: {}", mark)?;

        if let Some(outcome) = &result.outcome {
            if let Some(value) = outcome.returned_value() {
                writeln!(out, "  Function result: {}", value)?;
            }
            if let Some(message) = outcome.fault_message() {
                writeln!(out, "  Function error: {}", message)?;
            }
        }

        if !result.artifact_paths.is_empty() {
            let paths: Vec<String> = result
                .artifact_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            writeln!(out, "  Artifacts: {}", paths.join(", "))?;
        }
    }

    Ok(())
}

/// Printed instead of results when no workload was resolved
pub fn write_unresolved(out: &mut dyn Write, query: &str, units: &[WorkloadUnit]) -> io::Result<()> {
    writeln!(out, "No suitable workload found for '{}'", query)?;
    writeln!(out, "Available workloads:")?;
    if units.is_empty() {
        writeln!(out, "  (none discovered)")?;
    }
    for unit in units.iter().take(AVAILABLE_PREVIEW) {
        writeln!(out, "  - {} ({})", unit.name, unit.category)?;
    }
    if units.len() > AVAILABLE_PREVIEW {
        writeln!(out, "  ... and {} more", units.len() - AVAILABLE_PREVIEW)?;
    }
    Ok(())
}

/// Full listing for `--list`
pub fn write_listing(out: &mut dyn Write, units: &[WorkloadUnit]) -> io::Result<()> {
    for unit in units {
        writeln!(out, "{}\t{}\t{}", unit.category, unit.name, unit.code_path.display())?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    workload: Option<&'a str>,
    results: &'a [ProfileResult],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    available: Vec<&'a str>,
}

/// Machine-readable report of every result, including failed ones
pub fn write_json(
    out: &mut dyn Write,
    workload: Option<&WorkloadUnit>,
    results: &[ProfileResult],
    units: &[WorkloadUnit],
) -> io::Result<()> {
    let available = if workload.is_none() {
        units.iter().map(|u| u.name.as_str()).collect()
    } else {
        Vec::new()
    };
    let report = JsonReport {
        workload: workload.map(|u| u.name.as_str()),
        results,
        available,
    };
    serde_json::to_writer_pretty(&mut *out, &report).map_err(io::Error::from)?;
    writeln!(out)
}
