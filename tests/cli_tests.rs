// CLI behaviour of the syscost binary

#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

mod utils;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use utils::*;

fn touch_unit(root: &std::path::Path, category: &str, name: &str) {
    let dir = root.join(category).join(name).join("native");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("function.so"), b"").unwrap();
}

#[test]
fn test_list_prints_discovered_workloads() {
    let tmp = TempDir::new().unwrap();
    touch_unit(tmp.path(), "000.microbenchmarks", "010.sleep");
    touch_unit(tmp.path(), "200.multimedia", "210.thumbnailer");

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("--list").arg("-b").arg(tmp.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("000.microbenchmarks\t010.sleep"))
        .stdout(predicate::str::contains("200.multimedia\t210.thumbnailer"));
}

#[test]
fn test_unknown_workload_lists_available_and_succeeds() {
    let tmp = TempDir::new().unwrap();
    touch_unit(tmp.path(), "000.microbenchmarks", "010.sleep");

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("-b").arg(tmp.path()).args(["-w", "999.nothing"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No suitable workload found"))
        .stdout(predicate::str::contains("  - 010.sleep (000.microbenchmarks)"));
}

#[test]
fn test_invoke_missing_script_prints_error_line() {
    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.args(["--invoke", "/nonexistent/syscost_invoke.json"]);

    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::starts_with("ERROR: "));
}

#[test]
fn test_invoke_runs_handler() {
    let tmp = TempDir::new().unwrap();
    let library = build_workload(tmp.path(), "900.custom", "901.answer", ANSWER);
    let script = tmp.path().join("script.json");
    fs::write(
        &script,
        serde_json::json!({"code_path": library, "input": {"data": "test"}}).to_string(),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("--invoke").arg(&script);

    cmd.assert().success().stdout("{\"result\":42}\n");
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("syscost.toml");
    fs::write(&config, "spawn_timeout_secs = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("--config").arg(&config);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("spawn_timeout_secs"));
}

#[test]
fn test_full_run_with_fake_collector() {
    let tmp = TempDir::new().unwrap();
    let benchmarks = tmp.path().join("benchmarks");
    build_workload(&benchmarks, "200.multimedia", "210.thumbnailer", THUMBNAILER);
    let collector = fake_collector(tmp.path());
    let traces = tmp.path().join("traces");

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("-b")
        .arg(&benchmarks)
        .arg("-o")
        .arg(&traces)
        .arg("--collector")
        .arg(&collector)
        .args(["--readiness", "settle", "--settle-delay-ms", "100"])
        .args(["-w", "thumbnailer"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Testing with function: 210.thumbnailer"))
        .stdout(predicate::str::contains("Attach-mode profiling (full):"))
        .stdout(predicate::str::contains(
            "Function result: {\"thumbnail_path\":\"test_100.jpg\"}",
        ));

    for name in [
        "attach_summary_210.thumbnailer.txt",
        "attach_full_210.thumbnailer.txt",
        "fullpython_summary_210.thumbnailer.txt",
        "fullpython_full_210.thumbnailer.txt",
    ] {
        assert!(traces.join(name).exists(), "missing {}", name);
    }
}

#[test]
fn test_json_format_reports_all_results() {
    let tmp = TempDir::new().unwrap();
    let benchmarks = tmp.path().join("benchmarks");
    build_workload(&benchmarks, "900.custom", "900.faulty", FAULTY);
    let collector = fake_collector(tmp.path());

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("-b")
        .arg(&benchmarks)
        .arg("-o")
        .arg(tmp.path().join("traces"))
        .arg("--collector")
        .arg(&collector)
        .args(["--readiness", "settle", "--settle-delay-ms", "100"])
        .args(["-w", "900.faulty", "--format", "json"]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(report["workload"], "900.faulty");
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result["success"], true);
        assert_eq!(result["outcome"]["status"], "faulted");
        assert_eq!(result["outcome"]["detail"], "image not found");
    }
}

#[test]
fn test_debug_flag_emits_tracing_on_stderr() {
    let tmp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("--debug").arg("-b").arg(tmp.path()).args(["-w", "x"]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("DEBUG") || stderr.contains("WARN"),
        "No tracing output found in stderr: {}",
        stderr
    );
}

/// End to end with the real collector; needs strace and ptrace permission
#[test]
#[ignore]
fn test_real_strace_attach_and_spawn() {
    let tmp = TempDir::new().unwrap();
    let benchmarks = tmp.path().join("benchmarks");
    build_workload(&benchmarks, "200.multimedia", "210.thumbnailer", THUMBNAILER);
    let traces = tmp.path().join("traces");

    let mut cmd = Command::cargo_bin("syscost").unwrap();
    cmd.arg("-b")
        .arg(&benchmarks)
        .arg("-o")
        .arg(&traces)
        .args(["-w", "thumbnailer", "--format", "json"]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    for result in report["results"].as_array().unwrap() {
        assert_eq!(result["success"], true, "{}", result);
    }

    let summary = fs::read_to_string(traces.join("fullpython_summary_210.thumbnailer.txt")).unwrap();
    assert!(summary.contains("syscall"), "{}", summary);
}
