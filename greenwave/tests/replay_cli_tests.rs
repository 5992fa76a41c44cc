// tests/replay_cli_tests.rs
//
// End-to-end tests for the greenwave-replay binary.
//
// These tests verify that:
// 1. A recorded scenario replays and writes one telemetry line per decision
// 2. Seeded random runs are reproducible
// 3. Emergency brakes between decisions reach the summary
// 4. Malformed input fails with a non-zero exit status

use std::fs;
use std::path::Path;
use std::process::Command;

use greenwave::io::scripted::{four_way_network, Frame};
use greenwave::{DecisionRecord, Position, Scenario, VehicleId, VehicleState};
use tempfile::tempdir;

fn run_replay(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_greenwave-replay"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute greenwave-replay binary")
}

/// 21 one-step frames with a queue building up on the north approach.
fn write_scenario(path: &Path) {
    let frames = (0..21u64)
        .map(|t| Frame {
            time: t,
            vehicles: (0..=t / 4)
                .map(|i| {
                    let d = 40.0 - 7.5 * i as f64;
                    VehicleState::new(&format!("v{i}"), "n_0", Position::new(0.0, d.max(1.0)))
                        .with_waiting(t as f64)
                })
                .collect(),
            ..Frame::default()
        })
        .collect();
    let scenario = Scenario {
        network: four_way_network(),
        config: None,
        frames,
    };
    fs::write(path, serde_json::to_string_pretty(&scenario).unwrap()).unwrap();
}

fn read_records(path: &Path) -> Vec<DecisionRecord> {
    fs::read_to_string(path)
        .expect("Failed to read telemetry")
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("Failed to parse telemetry line"))
        .collect()
}

#[test]
fn replay_writes_one_record_per_decision() {
    let dir = tempdir().unwrap();
    let scenario = dir.path().join("scenario.json");
    let telemetry = dir.path().join("decisions.jsonl");
    write_scenario(&scenario);

    let out = run_replay(&[
        scenario.to_str().unwrap(),
        "--telemetry",
        telemetry.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let records = read_records(&telemetry);
    // Decisions at t = 0, 5, 10, 15, 20.
    let times: Vec<u64> = records.iter().map(|r| r.time).collect();
    assert_eq!(times, vec![0, 5, 10, 15, 20]);
    // Round-robin policy.
    let actions: Vec<usize> = records.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec![0, 1, 2, 3, 0]);
    for r in &records {
        let obs = r.observation.as_ref().unwrap();
        assert_eq!(obs.len(), 16);
        assert!(obs.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(r.reward.is_some());
        assert!(r.metrics.is_some());
    }

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("J: decisions=5"));
}

#[test]
fn seeded_random_policy_is_reproducible() {
    let dir = tempdir().unwrap();
    let scenario = dir.path().join("scenario.json");
    write_scenario(&scenario);

    let mut runs = Vec::new();
    for name in ["a.jsonl", "b.jsonl"] {
        let telemetry = dir.path().join(name);
        let out = run_replay(&[
            scenario.to_str().unwrap(),
            "--policy",
            "random",
            "--seed",
            "7",
            "--mode",
            "queue-only",
            "--telemetry",
            telemetry.to_str().unwrap(),
        ]);
        assert!(out.status.success());
        runs.push(read_records(&telemetry));
    }
    assert_eq!(runs[0], runs[1]);
    assert!(runs[0].iter().all(|r| r.reward.as_ref().unwrap().local_waiting == 0.0));
}

#[test]
fn emergency_brakes_between_decisions_are_counted() {
    let dir = tempdir().unwrap();
    let scenario_path = dir.path().join("scenario.json");
    write_scenario(&scenario_path);

    // v0 brakes hard on t = 1..=3, none of which is a decision step.
    let raw = fs::read_to_string(&scenario_path).unwrap();
    let mut scenario = Scenario::from_json(&raw).unwrap();
    for frame in scenario.frames.iter_mut().filter(|f| (1..=3).contains(&f.time)) {
        frame.emergency_stops = vec![VehicleId::new("v0")];
    }
    fs::write(&scenario_path, serde_json::to_string(&scenario).unwrap()).unwrap();

    let out = run_replay(&[scenario_path.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("emergency_brakes=3"), "stdout: {stdout}");
}

#[test]
fn malformed_scenario_fails() {
    let dir = tempdir().unwrap();
    let scenario = dir.path().join("broken.json");
    fs::write(&scenario, "{ not json").unwrap();

    let out = run_replay(&[scenario.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("parsing scenario"));
}

#[test]
fn missing_scenario_fails() {
    let out = run_replay(&["/definitely/not/here.json"]);
    assert!(!out.status.success());
}
