//! End-to-end CLI tests over temp job files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const JOB: &str = r#"{
    "schema": [
        {"name": "age", "kind": "numeric"},
        {"name": "income", "kind": "numeric"},
        {"name": "city", "kind": {"categorical": {"domain": ["A", "B"]}}}
    ],
    "affected": [
        [30, 800, "A"],
        [40, 900, "A"],
        [50, 600, "A"],
        [25, 100, "A"]
    ],
    "unaffected": [
        [60, 2000, "B"],
        [45, 1500, "A"]
    ],
    "feat_to_vary": ["income", "city"],
    "predictor": {"favorable_if_any": [
        {"feature": "income", "op": "gt", "value": 1000},
        {"feature": "city", "op": "eq", "value": "B"}
    ]},
    "source": {"kind": "nearest-neighbor", "neighbors_per_member": 2},
    "params": {"initial_clusters": 2, "final_clusters": 2, "seed": 13}
}"#;

fn write_job(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("job.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(JOB.as_bytes()).unwrap();
    path
}

#[test]
fn run_human_format_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir);
    Command::cargo_bin("gr-core")
        .unwrap()
        .args(["run", "--job"])
        .arg(&job)
        .args(["-f", "human"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Actions (K=2):"))
        .stdout(predicate::str::contains("Global effectiveness"));
}

#[test]
fn run_json_format_emits_a_parseable_report() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir);
    let output = Command::cargo_bin("gr-core")
        .unwrap()
        .args(["run", "--job"])
        .arg(&job)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["actions"].as_array().unwrap().len(), 2);
    assert_eq!(report["affected_count"], 4);
    let eff = report["global_effectiveness"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&eff));
}

#[test]
fn final_clusters_override_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir);
    let output = Command::cargo_bin("gr-core")
        .unwrap()
        .args(["run", "--final-clusters", "1", "--job"])
        .arg(&job)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["actions"].as_array().unwrap().len(), 1);
}

#[test]
fn invalid_size_relationship_maps_to_config_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir);
    Command::cargo_bin("gr-core")
        .unwrap()
        .args(["run", "--final-clusters", "9", "--job"])
        .arg(&job)
        .assert()
        .code(11)
        .stderr(predicate::str::contains("\"category\":\"config\""));
}

#[test]
fn missing_job_file_maps_to_io_exit_code() {
    Command::cargo_bin("gr-core")
        .unwrap()
        .args(["run", "--job", "/nonexistent/job.json"])
        .assert()
        .code(13);
}

#[test]
fn apply_subcommand_rewrites_rows() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_job(&dir);
    let action_path = dir.path().join("action.json");
    std::fs::write(&action_path, r#"{"income": {"add": 500}, "city": "B"}"#).unwrap();

    let output = Command::cargo_bin("gr-core")
        .unwrap()
        .args(["apply", "--job"])
        .arg(&job)
        .arg("--action")
        .arg(&action_path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][1], serde_json::json!(1300.0));
    assert_eq!(rows[0][2], serde_json::json!("B"));
    // unedited feature passes through
    assert_eq!(rows[0][0], serde_json::json!(30.0));
}
