//! Blocking waits and teardown for collector subprocesses
//!
//! Collectors run in their own process group so that a forced termination
//! also reaches the processes they spawned.

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval between exit-status polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Put the command in a new process group led by the child
pub fn isolate(cmd: &mut Command) -> &mut Command {
    cmd.process_group(0)
}

/// Wait for `child` to exit, giving up after `timeout`
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(pid = child.id(), "try_wait failed: {}", e);
                return None;
            }
        }
        if start.elapsed() >= timeout {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Send SIGINT to the process itself, not its group
pub fn interrupt(child: &Child) -> nix::Result<()> {
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT)
}

/// SIGKILL the child's process group and reap it; errors are swallowed
pub fn force_terminate(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        tracing::debug!(pgid = %pgid, "killpg failed: {}", e);
    }
    let _ = child.kill();
    if let Err(e) = child.wait() {
        tracing::debug!(pid = child.id(), "reaping killed collector failed: {}", e);
    }
}

/// Drain a pipe on a helper thread so the child never blocks on a full pipe
pub fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

/// Join a drain thread, yielding what it collected
pub fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
