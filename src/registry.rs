//! Workload discovery and input selection
//!
//! A workload unit lives at `<root>/<category>/<name>/<runtime>/function.so`
//! and is paired with a canned input payload looked up by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ProfilerError, Result};

/// File name of a workload's code entry point
pub const ENTRY_POINT_FILE: &str = "function.so";

/// File name of a workload's optional input description
pub const INPUT_FILE: &str = "input.json";

/// A discovered unit of workload code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadUnit {
    pub name: String,
    pub category: String,
    pub code_path: PathBuf,
    pub input_path: PathBuf,
}

/// Input handed to a workload's `handler`: string keys to scalar values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputPayload(Map<String, Value>);

impl InputPayload {
    /// Build a payload from key/value pairs
    ///
    /// # Example
    /// ```
    /// use syscost::registry::InputPayload;
    ///
    /// let input = InputPayload::from_pairs([("size", 100.into())]);
    /// assert_eq!(input.to_string(), r#"{"size":100}"#);
    /// ```
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Payload used for workloads with no mapping
    pub fn fallback() -> Self {
        Self::from_pairs([("data", Value::from("test"))])
    }

    /// Reject nested values; payloads are flat mappings of scalars
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.0 {
            if value.is_array() || value.is_object() {
                return Err(ProfilerError::Config(format!(
                    "input key '{}' must be a scalar, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Display for InputPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A map of strings to JSON values always serializes
        let encoded = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

/// Canned inputs for the known benchmark workloads
fn builtin_inputs() -> BTreeMap<String, InputPayload> {
    let table: [(&str, InputPayload); 15] = [
        (
            "110.dynamic-html",
            InputPayload::from_pairs([
                ("username", Value::from("testuser")),
                ("random_len", Value::from(10)),
            ]),
        ),
        (
            "130.crud-api",
            InputPayload::from_pairs([("action", Value::from("get")), ("id", Value::from("1"))]),
        ),
        (
            "210.thumbnailer",
            InputPayload::from_pairs([
                ("image", Value::from("test.jpg")),
                ("size", Value::from(100)),
            ]),
        ),
        (
            "220.video-processing",
            InputPayload::from_pairs([("video", Value::from("test.mp4"))]),
        ),
        (
            "311.compression",
            InputPayload::from_pairs([("text", Value::from("Hello World"))]),
        ),
        (
            "411.image-recognition",
            InputPayload::from_pairs([("image", Value::from("test.jpg"))]),
        ),
        (
            "501.graph-pagerank",
            InputPayload::from_pairs([("size", Value::from(10))]),
        ),
        (
            "502.graph-mst",
            InputPayload::from_pairs([("size", Value::from(10))]),
        ),
        (
            "503.graph-bfs",
            InputPayload::from_pairs([("size", Value::from(10))]),
        ),
        (
            "504.dna-visualisation",
            InputPayload::from_pairs([("sequence", Value::from("ATCGATCG"))]),
        ),
        (
            "020.network-benchmark",
            InputPayload::from_pairs([("port", Value::from(8080))]),
        ),
        (
            "030.clock-synchronization",
            InputPayload::from_pairs([("time", Value::from("12:00:00"))]),
        ),
        (
            "040.server-reply",
            InputPayload::from_pairs([("message", Value::from("hello"))]),
        ),
        (
            "010.sleep",
            InputPayload::from_pairs([("sleep_time", Value::from(1))]),
        ),
        (
            "120.uploader",
            InputPayload::from_pairs([
                ("file", Value::from("test.txt")),
                ("content", Value::from("hello world")),
            ]),
        ),
    ];

    table
        .into_iter()
        .map(|(name, input)| (name.to_string(), input))
        .collect()
}

/// Immutable snapshot of the discovered workloads and their inputs
///
/// Built once at startup and passed by reference to the orchestrator.
#[derive(Debug, Clone)]
pub struct Registry {
    units: Vec<WorkloadUnit>,
    inputs: BTreeMap<String, InputPayload>,
}

impl Registry {
    /// Walk `root` for workload entry points
    ///
    /// A missing root yields an empty registry rather than an error.
    pub fn discover(root: &Path) -> Result<Self> {
        let mut units = Vec::new();
        if root.is_dir() {
            collect_units(root, root, &mut units)?;
        } else {
            tracing::debug!(root = %root.display(), "benchmarks root not found");
        }
        units.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        units.dedup_by(|a, b| a.category == b.category && a.name == b.name);
        tracing::debug!(count = units.len(), "discovered workload units");

        Ok(Self::from_units(units))
    }

    /// Build a registry from an explicit unit list with the built-in inputs
    pub fn from_units(units: Vec<WorkloadUnit>) -> Self {
        Self {
            units,
            inputs: builtin_inputs(),
        }
    }

    /// Override or extend the input table
    pub fn with_inputs(mut self, overrides: BTreeMap<String, InputPayload>) -> Self {
        self.inputs.extend(overrides);
        self
    }

    /// All discovered units, ordered by (category, name)
    pub fn units(&self) -> &[WorkloadUnit] {
        &self.units
    }

    /// Find a unit by exact name
    pub fn find(&self, name: &str) -> Option<&WorkloadUnit> {
        self.units.iter().find(|unit| unit.name == name)
    }

    /// Resolve a workload by exact name, else by the first name containing `query`
    ///
    /// `thumbnailer` resolves `210.thumbnailer`.
    pub fn resolve(&self, query: &str) -> Option<&WorkloadUnit> {
        if query.is_empty() {
            return None;
        }
        self.find(query)
            .or_else(|| self.units.iter().find(|unit| unit.name.contains(query)))
    }

    /// Canned input for a workload name, `{"data": "test"}` when unmapped
    pub fn input_for(&self, name: &str) -> InputPayload {
        self.inputs
            .get(name)
            .cloned()
            .unwrap_or_else(InputPayload::fallback)
    }
}

fn collect_units(root: &Path, dir: &Path, units: &mut Vec<WorkloadUnit>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProfilerError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProfilerError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_units(root, &path, units)?;
        } else if path.file_name().is_some_and(|f| f == ENTRY_POINT_FILE) {
            if let Some(unit) = unit_from_entry_point(root, &path) {
                units.push(unit);
            }
        }
    }
    Ok(())
}

/// `<root>/<category>/<name>/<runtime>/function.so` → unit
fn unit_from_entry_point(root: &Path, code_path: &Path) -> Option<WorkloadUnit> {
    let relative = code_path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if parts.len() < 4 {
        return None;
    }

    Some(WorkloadUnit {
        category: parts[0].to_string(),
        name: parts[1].to_string(),
        code_path: code_path.to_path_buf(),
        input_path: code_path.with_file_name(INPUT_FILE),
    })
}
