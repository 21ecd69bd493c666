//! syscost - syscall cost profiler for dynamically loaded workloads
//!
//! This library measures what a workload unit costs the operating system in
//! two regimes: attached to this already-running process while it loads and
//! runs the workload, and spawned from scratch so that runtime start-up is
//! included. The external collector (`strace` by default) produces the trace
//! artifacts; this crate owns the protocol around it.

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod process;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod session;
pub mod spawn;
