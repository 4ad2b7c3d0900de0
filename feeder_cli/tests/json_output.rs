use assert_cmd::prelude::*;
use rstest::rstest;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir) -> PathBuf {
    let history = dir.path().join("history.csv");
    let toml = format!(
        r#"
[schedule]
auto_feed = false

[feeding]
target_weight = 20.0

[runner]
tick_ms = 1

[history]
path = {history:?}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn run_json(cfg: &PathBuf, args: &[&str]) -> (i32, Value) {
    let out = Command::cargo_bin("feeder")
        .unwrap()
        .env_remove("RUST_LOG")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg)
        .args(args)
        .output()
        .unwrap();
    let stdout = String::from_utf8(out.stdout).unwrap();
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with(['{', '[']))
        .unwrap_or_else(|| panic!("no JSON on stdout: {stdout}"));
    let v: Value = serde_json::from_str(line).unwrap();
    (out.status.code().unwrap_or(-1), v)
}

#[rstest]
fn feed_reports_final_status() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let (code, v) = run_json(&cfg, &["--simulate", "feed"]);
    assert_eq!(code, 0, "{v}");
    assert_eq!(v["state"], "IDLE");
    assert_eq!(v["stage"], "COMPLETED");
    assert_eq!(v["actuator_1"], false);
    assert_eq!(v["actuator_2"], false);
    assert_eq!(v["unit"], "lb");
    assert_eq!(v["target_weight"].as_f64(), Some(20.0));
    let dispensed = v["dispensed"].as_f64().unwrap();
    assert!((20.0..21.0).contains(&dispensed), "dispensed {dispensed}");
    assert!(v["alarm"].is_null());

    // The completed cycle shows up in history as a manual run.
    let (code, rows) = run_json(&cfg, &["history", "--limit", "5"]);
    assert_eq!(code, 0);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["cycle"].is_null());
    assert_eq!(rows[0]["alarm"], false);
    assert_eq!(rows[0]["target_weight"].as_f64(), Some(20.0));
}

#[rstest]
fn bins_lists_four_weights() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let (code, v) = run_json(&cfg, &["--simulate", "bins"]);
    assert_eq!(code, 0);
    let bins = v["bins"].as_array().unwrap();
    assert_eq!(bins.len(), 4);
    assert_eq!(v["total"].as_f64(), Some(500.0));
}

#[rstest]
fn errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = Command::cargo_bin("feeder")
        .unwrap()
        .env("FEEDER_SIM_FAIL_READS", "1")
        .args(["--json", "--log-level", "error", "--simulate", "--config"])
        .arg(&cfg)
        .arg("bins")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["reason"], "Telemetry");
    assert_eq!(v["exit_code"], 3);
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}

#[rstest]
fn schedule_lists_slots() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let (code, v) = run_json(&cfg, &["schedule"]);
    assert_eq!(code, 0);
    let slots = v["feed_times"].as_array().unwrap();
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[3]["time"], "22:00");
    assert_eq!(v["auto_feed"], false);
}
