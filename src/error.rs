//! Error types for the trace controller and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised below the trace controller boundary
///
/// None of these escape a profiling run: the controller converts them into
/// a `ProfileResult` with `success: false`.
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("collector unavailable: {0}")]
    CollectorUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid invocation script: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProfilerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
