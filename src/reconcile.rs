//! Result reconciliation
//!
//! Merges how a trace session closed with what the workload itself did into
//! a single `ProfileResult`. `success` describes the measurement protocol,
//! not the workload: a handler fault is a successful measurement whose
//! outcome carries the fault message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::collector::Granularity;
use crate::registry::InputPayload;

/// Terminal state of one workload execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The handler returned this value
    Returned(Value),
    /// Loading or running the handler failed
    Faulted(String),
    /// The run exceeded its wall-clock bound
    TimedOut,
}

impl ExecutionOutcome {
    pub fn returned_value(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Returned(value) => Some(value),
            _ => None,
        }
    }

    pub fn fault_message(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Faulted(message) => Some(message),
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, ExecutionOutcome::TimedOut)
    }
}

impl<E: fmt::Display> From<Result<Value, E>> for ExecutionOutcome {
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(value) => ExecutionOutcome::Returned(value),
            Err(fault) => ExecutionOutcome::Faulted(fault.to_string()),
        }
    }
}

/// Which of the three measurement passes produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    AttachSummary,
    AttachFull,
    Spawn,
}

impl ProfileMode {
    pub fn attach(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Summary => ProfileMode::AttachSummary,
            Granularity::Full => ProfileMode::AttachFull,
        }
    }

    /// Heading used in the text report
    pub fn label(self) -> &'static str {
        match self {
            ProfileMode::AttachSummary => "Attach-mode profiling (summary)",
            ProfileMode::AttachFull => "Attach-mode profiling (full)",
            ProfileMode::Spawn => "Spawn-mode profiling",
        }
    }
}

/// Wall-clock interval during which a collector was recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWindow {
    pub started_at_us: u64,
    pub ended_at_us: u64,
}

impl ObservationWindow {
    /// Open a window at the current time
    pub fn open() -> Self {
        let now = now_us();
        Self {
            started_at_us: now,
            ended_at_us: now,
        }
    }

    /// Close the window at the current time
    pub fn close(self) -> Self {
        Self {
            ended_at_us: now_us().max(self.started_at_us),
            ..self
        }
    }

    pub fn duration_us(&self) -> u64 {
        self.ended_at_us.saturating_sub(self.started_at_us)
    }

    /// True when the two intervals share any instant
    pub fn overlaps(&self, other: &ObservationWindow) -> bool {
        self.started_at_us < other.ended_at_us && other.started_at_us < self.ended_at_us
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// How a trace session ended
#[derive(Debug, Clone, Default)]
pub struct SessionClosure {
    /// Artifacts in the order they were produced
    pub artifact_paths: Vec<PathBuf>,
    pub window: Option<ObservationWindow>,
    /// The collector ignored SIGINT and had to be killed
    pub escalated: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of one (workload, mode) profiling pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    pub workload_name: String,
    pub mode: ProfileMode,
    /// The measurement protocol ran to completion
    pub success: bool,
    /// `None` when the session failed before the workload ran
    pub outcome: Option<ExecutionOutcome>,
    pub input: InputPayload,
    pub artifact_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<ObservationWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub collector_escalated: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl ProfileResult {
    /// A session that could not run its protocol
    pub fn failed(
        workload_name: &str,
        mode: ProfileMode,
        input: &InputPayload,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            workload_name: workload_name.to_string(),
            mode,
            success: false,
            outcome: None,
            input: input.clone(),
            artifact_paths: Vec::new(),
            window: None,
            error: Some(error.to_string()),
            collector_escalated: false,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// The handler returned a value
    pub fn workload_executed(&self) -> bool {
        self.outcome
            .as_ref()
            .is_some_and(|o| o.returned_value().is_some())
    }
}

/// Combine a closed session with the workload's outcome
///
/// A returned value or a fault both mark the protocol as complete; a
/// timeout does not, and keeps only whatever artifacts were flushed.
pub fn reconcile(
    workload_name: &str,
    mode: ProfileMode,
    input: &InputPayload,
    closure: SessionClosure,
    outcome: ExecutionOutcome,
) -> ProfileResult {
    let success = !outcome.timed_out();
    let error = (!success).then(|| match mode {
        ProfileMode::Spawn => "spawn-mode execution timed out".to_string(),
        _ => "execution timed out".to_string(),
    });

    if closure.escalated {
        tracing::warn!(
            workload = workload_name,
            ?mode,
            "collector ignored interrupt and was killed"
        );
    }

    ProfileResult {
        workload_name: workload_name.to_string(),
        mode,
        success,
        outcome: Some(outcome),
        input: input.clone(),
        artifact_paths: closure.artifact_paths,
        window: closure.window,
        error,
        collector_escalated: closure.escalated,
        stdout: closure.stdout,
        stderr: closure.stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn closure(paths: &[&str]) -> SessionClosure {
        SessionClosure {
            artifact_paths: paths.iter().map(PathBuf::from).collect(),
            window: Some(ObservationWindow::open().close()),
            ..Default::default()
        }
    }

    #[test]
    fn test_returned_value_is_success() {
        let input = InputPayload::fallback();
        let result = reconcile(
            "w",
            ProfileMode::AttachFull,
            &input,
            closure(&["attach_full_w.txt"]),
            ExecutionOutcome::Returned(json!({"result": 42})),
        );
        assert!(result.success);
        assert!(result.error.is_none());
        let outcome = result.outcome.as_ref().unwrap();
        assert_eq!(outcome.returned_value(), Some(&json!({"result": 42})));
        assert!(outcome.fault_message().is_none());
        assert_eq!(result.input, input);
    }

    #[test]
    fn test_fault_is_still_protocol_success() {
        let result = reconcile(
            "w",
            ProfileMode::AttachSummary,
            &InputPayload::fallback(),
            closure(&["attach_summary_w.txt"]),
            ExecutionOutcome::Faulted("boom".to_string()),
        );
        assert!(result.success);
        let outcome = result.outcome.unwrap();
        assert_eq!(outcome.fault_message(), Some("boom"));
        assert!(outcome.returned_value().is_none());
    }

    #[test]
    fn test_timeout_is_failure() {
        let result = reconcile(
            "w",
            ProfileMode::Spawn,
            &InputPayload::fallback(),
            closure(&[]),
            ExecutionOutcome::TimedOut,
        );
        assert!(!result.success);
        assert!(result.outcome.unwrap().timed_out());
        assert_eq!(result.error.as_deref(), Some("spawn-mode execution timed out"));
    }

    #[test]
    fn test_failed_session_has_no_outcome() {
        let result = ProfileResult::failed(
            "w",
            ProfileMode::AttachFull,
            &InputPayload::fallback(),
            "collector unavailable: strace not found",
        );
        assert!(!result.success);
        assert!(result.outcome.is_none());
        assert!(!result.workload_executed());
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<Value, String> = Ok(json!(1));
        let err: Result<Value, String> = Err("bad".to_string());
        assert_eq!(ExecutionOutcome::from(ok), ExecutionOutcome::Returned(json!(1)));
        assert_eq!(
            ExecutionOutcome::from(err),
            ExecutionOutcome::Faulted("bad".to_string())
        );
    }

    #[test]
    fn test_window_overlap() {
        let a = ObservationWindow { started_at_us: 10, ended_at_us: 20 };
        let b = ObservationWindow { started_at_us: 20, ended_at_us: 30 };
        let c = ObservationWindow { started_at_us: 15, ended_at_us: 25 };
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
        assert_eq!(a.duration_us(), 10);
    }

    #[test]
    fn test_inverted_window_has_zero_duration() {
        let window: ObservationWindow =
            serde_json::from_value(json!({"started_at_us": 30, "ended_at_us": 10})).unwrap();
        assert_eq!(window.duration_us(), 0);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let encoded = serde_json::to_value(ExecutionOutcome::TimedOut).unwrap();
        assert_eq!(encoded, json!({"status": "timed_out"}));
    }
}
