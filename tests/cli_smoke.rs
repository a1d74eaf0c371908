use std::path::Path;
use std::process::Command;

use serde_json::{json, Value};
use tempfile::tempdir;

/// Two clean groups over twenty units, plus a fragment `F` agreeing with group B.
fn write_collation(path: &Path) {
    let units: Vec<Value> = (0..20)
        .map(|i| {
            let mut b = vec!["B1", "B2", "B3", "B4*"];
            if i < 5 {
                b.push("F");
            }
            json!({
                "id": format!("Rom.1.{i}"),
                "readings": [
                    {"id": "a", "text": "kai", "witnesses": ["A1", "A2", "A3"]},
                    {"id": "b", "witnesses": b},
                    {"id": "zz", "type": "lac", "witnesses": ["P46"]}
                ]
            })
        })
        .collect();
    std::fs::write(path, json!({ "units": units }).to_string()).unwrap();
}

fn run(args: &[&str], input: &Path, out: &Path) {
    let status = Command::new(env!("CARGO_BIN_EXE_collation-nmf"))
        .args(args)
        .arg(input)
        .args(["-z", "lac", "-s", "*"])
        .arg("--out")
        .arg(out)
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn factorize_writes_report() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("collation.json");
    let out = dir.path().join("report.json");
    write_collation(&input);

    let status = Command::new(env!("CARGO_BIN_EXE_collation-nmf"))
        .args(["factorize"])
        .arg(&input)
        .args(["2", "-z", "lac", "-s", "*", "--normalize"])
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["summary"]["rank"], 2);
    assert_eq!(report["witness_groupings"].as_array().unwrap().len(), 7);
    assert_eq!(report["group_profiles"].as_array().unwrap().len(), 40);
    assert_eq!(report["group_profiles"][0]["reading"], "Rom.1.0 a kai");

    let fragments = report["fragmentary_witness_groups"].as_array().unwrap();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0]["witness"], "F");
    assert_eq!(fragments[0]["source"], "nnls");
    let total: f64 = fragments[0]["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g.as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9);

    let witnesses: Vec<&str> = report["witness_groupings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["witness"].as_str().unwrap())
        .collect();
    assert!(witnesses.contains(&"B4"));
    assert!(!witnesses.contains(&"P46"));
}

#[test]
fn matrix_exports_csv() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("collation.json");
    let out = dir.path().join("matrix.csv");
    write_collation(&input);

    run(&["matrix", "--format", "csv"], &input, &out);

    let csv = std::fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next().unwrap(), "reading,A1,A2,A3,B1,B2,B3,B4,F");
    assert_eq!(lines.next().unwrap(), "Rom.1.0 a kai,1,1,1,0,0,0,0,0");
    assert_eq!(csv.lines().count(), 41);
}

#[test]
fn estimate_rank_reports_each_rank() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("collation.json");
    let out = dir.path().join("ranks.json");
    write_collation(&input);

    // Positional ranks follow the input path.
    let status = Command::new(env!("CARGO_BIN_EXE_collation-nmf"))
        .args(["estimate-rank", "--nrun", "2"])
        .arg(&input)
        .args(["1", "3", "-z", "lac"])
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let metrics: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let ranks: Vec<u64> = metrics
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[test]
fn malformed_collation_fails() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("collation.json");
    std::fs::write(
        &input,
        json!({"units": [{"id": "u1", "readings": [
            {"id": "af1", "type": "defective", "witnesses": ["A"]}
        ]}]})
        .to_string(),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_collation-nmf"))
        .args(["matrix"])
        .arg(&input)
        .args(["-t", "defective"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("u1"), "stderr: {stderr}");
}

#[test]
fn full_matrix_export_needs_no_complete_witness() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("collation.json");
    let out = dir.path().join("matrix.csv");
    std::fs::write(
        &input,
        json!({"units": [
            {"id": "u0", "readings": [{"id": "a", "witnesses": ["A"]}]},
            {"id": "u1", "readings": [{"id": "a", "witnesses": ["B"]}]}
        ]})
        .to_string(),
    )
    .unwrap();

    run(&["matrix", "--format", "csv"], &input, &out);
    let csv = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        csv.lines().collect::<Vec<_>>(),
        vec!["reading,A,B", "u0 a,1,0", "u1 a,0,1"]
    );

    let status = Command::new(env!("CARGO_BIN_EXE_collation-nmf"))
        .args(["matrix", "--training"])
        .arg(&input)
        .output()
        .unwrap()
        .status;
    assert!(!status.success());
}
