use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn scale_monitor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scale-monitor"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to launch scale-monitor")
}

fn journal_weights(path: &Path) -> Vec<f64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(entry["unix_us"].as_u64().unwrap() > 0);
            entry["weight_kg"].as_f64().unwrap()
        })
        .collect()
}

#[test]
fn simulated_weighing_is_journaled_once() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("weights.jsonl");

    let output = scale_monitor(&[
        "--simulate",
        "40.0",
        "--sim-frame-ms",
        "0",
        "--quiet-window-ms",
        "300",
        "--poll-ms",
        "50",
        "--journal",
        journal.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(journal_weights(&journal), vec![40.0]);
}

#[test]
fn test_mode_records_zero_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("check/weights.jsonl");

    let output = scale_monitor(&["--test", "--journal", journal.to_str().unwrap()]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(journal_weights(&journal), vec![0.0]);
}

#[test]
fn replayed_capture_with_noise_is_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("weights.jsonl");
    let capture = dir.path().join("capture.txt");

    // 40.0 kg, stable: AB 8C 01 90 C8
    let frame = [0xABu8, 0x8C, 0x01, 0x90, 0xC8];
    let mut text = String::from("# mode2 capture\nspace 3000\npulse 480\n");
    for _ in 0..12 {
        text.push_str("space 75000\n");
        let bits = frame.iter().flat_map(|&b| (0..8u8).rev().map(move |i| (b >> i) & 1));
        let mut lines: Vec<String> = bits
            .map(|bit| {
                let space = if bit == 1 { 520 } else { 1010 };
                format!("pulse 490\nspace {space}\n")
            })
            .collect();
        // The last gap merges into the next sync gap
        if let Some(last) = lines.last_mut() {
            *last = "pulse 490\n".to_string();
        }
        text.push_str(&lines.concat());
    }
    fs::write(&capture, text).unwrap();

    let output = scale_monitor(&[
        "--replay",
        capture.to_str().unwrap(),
        "--quiet-window-ms",
        "200",
        "--poll-ms",
        "50",
        "--journal",
        journal.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(journal_weights(&journal), vec![40.0]);
}

#[test]
fn missing_replay_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = scale_monitor(&[
        "--replay",
        dir.path().join("absent.txt").to_str().unwrap(),
        "--journal",
        dir.path().join("weights.jsonl").to_str().unwrap(),
    ]);

    assert!(!output.status.success());
}

#[test]
fn help_exits_cleanly() {
    let output = scale_monitor(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--simulate"));
}
