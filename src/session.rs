//! Attach-mode trace sessions
//!
//! A session attaches the collector to a live process, waits until the
//! collector is really observing it, lets the caller run the workload inside
//! the observation window, then interrupts the collector and waits for it to
//! flush its artifact.
//!
//! ```text
//! Starting --ready--> Active --stop()--> Stopping --exit/kill--> Closed
//!     \---------------- start-up failure ------------------------/
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::collector::{artifact_path, CollectorCommand, Granularity, TraceMode};
use crate::config::{ProfilerConfig, Readiness};
use crate::error::{ProfilerError, Result};
use crate::loader::Loader;
use crate::process;
use crate::reconcile::{
    reconcile, ExecutionOutcome, ObservationWindow, ProfileMode, ProfileResult, SessionClosure,
};
use crate::registry::{InputPayload, WorkloadUnit};

/// Lifecycle of a trace session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Active,
    Stopping,
    Closed,
}

/// A collector attached to a running process
pub struct TraceSession {
    granularity: Granularity,
    pid: u32,
    artifact: PathBuf,
    state: SessionState,
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
    window: Option<ObservationWindow>,
    stop_timeout: Duration,
    _ptracer: Option<PtracerGuard>,
}

impl TraceSession {
    /// Start the collector against `pid` and wait until it is attached
    ///
    /// # Errors
    ///
    /// `CollectorUnavailable` when the collector cannot be started, exits
    /// during start-up, or does not attach before the deadline.
    pub fn attach(
        config: &ProfilerConfig,
        pid: u32,
        granularity: Granularity,
        artifact: PathBuf,
    ) -> Result<Self> {
        let ptracer = (pid == std::process::id())
            .then(PtracerGuard::grant)
            .flatten();

        let collector = CollectorCommand::new(config.collector.as_str(), granularity, &artifact);
        let mut cmd = collector.attach(pid);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        process::isolate(&mut cmd);

        tracing::debug!(args = ?collector.attach_args(pid), "starting collector");
        let mut child = cmd.spawn().map_err(|e| {
            ProfilerError::CollectorUnavailable(format!(
                "failed to start {}: {}",
                collector.program(),
                e
            ))
        })?;
        let stderr = process::drain(child.stderr.take());

        let mut session = Self {
            granularity,
            pid,
            artifact,
            state: SessionState::Starting,
            child: Some(child),
            stderr,
            window: None,
            stop_timeout: config.stop_timeout(),
            _ptracer: ptracer,
        };

        session.await_readiness(config)?;
        session.state = SessionState::Active;
        session.window = Some(ObservationWindow::open());
        tracing::info!(
            pid,
            granularity = %granularity,
            artifact = %session.artifact.display(),
            "collector attached"
        );

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Interrupt the collector and wait for it to flush
    ///
    /// The window closes when the interrupt is sent. A collector that ignores
    /// the interrupt past the stop timeout is killed; the session still
    /// closes normally and reports the escalation.
    pub fn stop(mut self) -> SessionClosure {
        self.state = SessionState::Stopping;
        let window = self.window.take().map(ObservationWindow::close);

        let escalated = match self.child.take() {
            Some(mut child) => interrupt_and_wait(&mut child, self.stop_timeout),
            None => false,
        };

        let stderr = process::collect(self.stderr.take());
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "collector stderr");
        }

        self.close();
        tracing::info!(
            pid = self.pid,
            artifact = %self.artifact.display(),
            escalated,
            "collector stopped"
        );

        SessionClosure {
            artifact_paths: vec![self.artifact.clone()],
            window,
            escalated,
            ..Default::default()
        }
    }

    fn await_readiness(&mut self, config: &ProfilerConfig) -> Result<()> {
        match config.readiness {
            Readiness::Settle => {
                thread::sleep(config.settle_delay());
                self.ensure_running()
            }
            Readiness::Probe => {
                let deadline = Instant::now() + config.attach_deadline();
                loop {
                    self.ensure_running()?;
                    if tracer_pid(self.pid).is_some_and(|tracer| tracer != 0) {
                        return Ok(());
                    }
                    if Instant::now() >= deadline {
                        return Err(ProfilerError::CollectorUnavailable(format!(
                            "collector did not attach to pid {} within {:?}",
                            self.pid,
                            config.attach_deadline()
                        )));
                    }
                    thread::sleep(process::POLL_INTERVAL);
                }
            }
        }
    }

    /// Fail if the collector already exited, e.g. on permission denied
    fn ensure_running(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(ProfilerError::CollectorUnavailable(
                "collector is not running".to_string(),
            ));
        };

        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                self.child = None;
                let stderr = process::collect(self.stderr.take());
                Err(ProfilerError::CollectorUnavailable(format!(
                    "collector exited during start-up ({}): {}",
                    status,
                    stderr.trim()
                )))
            }
            Err(e) => Err(ProfilerError::CollectorUnavailable(e.to_string())),
        }
    }

    /// Move to `Closed`, leaving an artifact behind even if the collector wrote none
    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = ensure_artifact(&self.artifact) {
            tracing::warn!("{}", e);
        }
        self._ptracer = None;
        self.state = SessionState::Closed;
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::warn!(pid = self.pid, "trace session dropped while active, killing collector");
            process::force_terminate(&mut child);
        }
        process::collect(self.stderr.take());
        self.close();
    }
}

/// Returns true when the collector had to be killed
fn interrupt_and_wait(child: &mut Child, timeout: Duration) -> bool {
    if let Err(e) = process::interrupt(child) {
        tracing::warn!(pid = child.id(), "failed to interrupt collector: {}", e);
    }
    if process::wait_with_timeout(child, timeout).is_some() {
        return false;
    }

    tracing::warn!(
        pid = child.id(),
        ?timeout,
        "collector did not exit after interrupt, escalating to SIGKILL"
    );
    process::force_terminate(child);
    true
}

/// Create an empty artifact when the collector produced none
pub(crate) fn ensure_artifact(path: &Path) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| ProfilerError::io(path, e))
}

/// `TracerPid` of a process, from `/proc/<pid>/status`
fn tracer_pid(pid: u32) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    parse_tracer_pid(&status)
}

fn parse_tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Lets any process trace this one until dropped
///
/// Under Yama `ptrace_scope=1` a collector cannot attach to its own parent
/// without this.
struct PtracerGuard;

const PR_SET_PTRACER_ANY: libc::c_ulong = libc::c_ulong::MAX;

impl PtracerGuard {
    fn grant() -> Option<Self> {
        let rc = unsafe { libc::prctl(libc::PR_SET_PTRACER, PR_SET_PTRACER_ANY, 0, 0, 0) };
        if rc != 0 {
            // Yama not enabled; nothing to grant
            tracing::debug!(
                "PR_SET_PTRACER unavailable: {}",
                std::io::Error::last_os_error()
            );
            return None;
        }
        Some(Self)
    }
}

impl Drop for PtracerGuard {
    fn drop(&mut self) {
        let zero: libc::c_ulong = 0;
        unsafe {
            libc::prctl(libc::PR_SET_PTRACER, zero, 0, 0, 0);
        }
    }
}

/// Profile a workload inside this process with the collector attached
///
/// Loader and handler faults are captured in the outcome; they never skip
/// the stop protocol.
pub fn profile_attached(
    config: &ProfilerConfig,
    loader: &dyn Loader,
    unit: &WorkloadUnit,
    input: &InputPayload,
    granularity: Granularity,
) -> ProfileResult {
    let mode = ProfileMode::attach(granularity);
    let artifact = artifact_path(&config.output_dir, TraceMode::Attach, granularity, &unit.name);
    tracing::info!(
        workload = %unit.name,
        granularity = %granularity,
        code_path = %unit.code_path.display(),
        input = %input,
        "profiling in current runtime"
    );

    let pid = std::process::id();
    let session = match TraceSession::attach(config, pid, granularity, artifact.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(workload = %unit.name, "attach failed: {}", e);
            let mut result = ProfileResult::failed(&unit.name, mode, input, e);
            // A collector that started and then failed still leaves its artifact
            if artifact.exists() {
                result.artifact_paths.push(artifact);
            }
            return result;
        }
    };

    let outcome = ExecutionOutcome::from(loader.load_and_invoke(&unit.code_path, input));

    let closure = session.stop();
    reconcile(&unit.name, mode, input, closure, outcome)
}
