// Shared fixtures: stand-in collectors and C workload units
//
// The stand-in collectors honour the strace command-line shapes used by
// syscost without needing ptrace privileges.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use syscost::config::{ProfilerConfig, Readiness};

/// Attach: write an artifact and wait for SIGINT. Spawn: exec the command.
const FAKE_COLLECTOR: &str = r#"#!/bin/sh
out=""
pid=""
while [ $# -gt 0 ]; do
  case "$1" in
    -c|-f) shift ;;
    -p) pid="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) break ;;
  esac
done
if [ -n "$pid" ]; then
  echo "attached $pid" > "$out"
  trap 'echo "detached $pid" >> "$out"; exit 0' INT
  while :; do sleep 0.05; done
fi
echo "spawned $*" > "$out"
exec "$@"
"#;

/// Attach collector that ignores SIGINT
const STUBBORN_COLLECTOR: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
trap '' INT
echo "attached" > "$out"
while :; do sleep 0.05; done
"#;

pub const THUMBNAILER: &str = r#"
#include <stdlib.h>
#include <string.h>

int handler(const char *input, char **output) {
    (void)input;
    *output = strdup("{\"thumbnail_path\": \"test_100.jpg\"}");
    return 0;
}
"#;

pub const ANSWER: &str = r#"
#include <string.h>

int handler(const char *input, char **output) {
    (void)input;
    *output = strdup("{\"result\": 42}");
    return 0;
}
"#;

pub const FAULTY: &str = r#"
#include <string.h>

int handler(const char *input, char **output) {
    (void)input;
    *output = strdup("image not found");
    return 1;
}
"#;

pub const SLEEPER: &str = r#"
#include <stdlib.h>
#include <string.h>
#include <unistd.h>

int handler(const char *input, char **output) {
    const char *key = strstr(input, "\"sleep_time\":");
    int seconds = key ? atoi(key + strlen("\"sleep_time\":")) : 0;
    sleep(seconds);
    *output = strdup("{\"slept\": true}");
    return 0;
}
"#;

pub const HANG: &str = r#"
#include <string.h>
#include <unistd.h>

int handler(const char *input, char **output) {
    (void)input;
    sleep(30);
    *output = strdup("null");
    return 0;
}
"#;

/// Counts its own invocations in static storage
pub const COUNTER: &str = r#"
#include <stdio.h>
#include <string.h>

static int calls = 0;

int handler(const char *input, char **output) {
    (void)input;
    char buf[32];
    calls++;
    snprintf(buf, sizeof buf, "{\"calls\": %d}", calls);
    *output = strdup(buf);
    return 0;
}
"#;

pub const ECHO: &str = r#"
#include <string.h>

int handler(const char *input, char **output) {
    *output = strdup(input);
    return 0;
}
"#;

fn write_executable(path: &Path, body: &str) -> PathBuf {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

pub fn fake_collector(dir: &Path) -> PathBuf {
    write_executable(&dir.join("fake-strace"), FAKE_COLLECTOR)
}

pub fn stubborn_collector(dir: &Path) -> PathBuf {
    write_executable(&dir.join("stubborn-strace"), STUBBORN_COLLECTOR)
}

/// Compile `source` into `<root>/<category>/<name>/native/function.so`
pub fn build_workload(root: &Path, category: &str, name: &str, source: &str) -> PathBuf {
    let dir = root.join(category).join(name).join("native");
    fs::create_dir_all(&dir).unwrap();
    let source_file = dir.join("function.c");
    fs::write(&source_file, source).unwrap();

    let library = dir.join("function.so");
    let output = std::process::Command::new("gcc")
        .args(["-shared", "-fPIC", "-o"])
        .arg(&library)
        .arg(&source_file)
        .output()
        .expect("Failed to run gcc");
    assert!(
        output.status.success(),
        "gcc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    library
}

/// Config wired to the fake collector and the built syscost interpreter
pub fn test_config(root: &Path) -> ProfilerConfig {
    let scripts = root.join("scripts");
    fs::create_dir_all(&scripts).unwrap();
    fs::create_dir_all(root.join("traces")).unwrap();
    ProfilerConfig {
        collector: fake_collector(root).display().to_string(),
        interpreter: vec![
            env!("CARGO_BIN_EXE_syscost").to_string(),
            "--invoke".to_string(),
        ],
        benchmarks_root: root.join("benchmarks"),
        output_dir: root.join("traces"),
        script_dir: Some(scripts),
        readiness: Readiness::Settle,
        settle_delay_ms: 100,
        stop_timeout_ms: 5000,
        ..Default::default()
    }
}

/// Live processes whose command line mentions `program`
pub fn running_processes(program: &Path) -> usize {
    let needle = program.display().to_string();
    fs::read_dir("/proc")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().parse::<u32>().is_ok())
        .filter_map(|entry| fs::read(entry.path().join("cmdline")).ok())
        .filter(|cmdline| String::from_utf8_lossy(cmdline).contains(&needle))
        .count()
}

pub fn is_nonempty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
