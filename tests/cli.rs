use std::process::Command;

use doa_array::fixtures::write_recording;
use doa_array::testing::synth::{PlaneWave, SynthConfig};
use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_doa_cli"))
}

#[test]
fn simulate_locates_plane_wave() {
    let output = cli()
        .args(["simulate", "--azimuth", "120", "--frames", "2", "--json"])
        .output()
        .expect("failed to run doa_cli simulate");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "two snapshots and a summary: {:?}", lines);

    let summary: Value = serde_json::from_str(lines[2]).expect("summary JSON");
    assert_eq!(summary["frames_processed"], 2);

    for (index, line) in lines[..2].iter().enumerate() {
        let snapshot: Value = serde_json::from_str(line).expect("snapshot JSON");
        assert_eq!(snapshot["frame_index"], index as u64 + 1);
        assert_eq!(snapshot["predictions"]["mode"], "single");
        let azimuth = snapshot["predictions"]["azimuth"]["angle_deg"]
            .as_u64()
            .unwrap_or_default();
        assert!((118..=122).contains(&azimuth), "azimuth {}", azimuth);
    }
}

#[test]
fn simulate_prints_a_line_for_every_active_frame() {
    let output = cli()
        .args(["simulate", "--azimuth", "120", "--frames", "60"])
        .output()
        .expect("failed to run doa_cli simulate");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let diagnostics = stdout
        .lines()
        .filter(|line| line.starts_with("Azimuth:"))
        .count();
    assert_eq!(diagnostics, 60);
    assert!(stdout.contains("Frames processed: 60 (60 with inference)"));
}

#[test]
fn replay_prints_one_line_per_frame() {
    let wave = PlaneWave::new(250.0, SynthConfig::default());
    let frames: Vec<_> = (0..3).map(|i| wave.raw_frame_at(i, 2).unwrap()).collect();
    let path = std::env::temp_dir().join(format!("doa_cli_replay_{}.wav", std::process::id()));
    write_recording(&path, &frames).unwrap();

    let output = cli()
        .args(["replay", "--input"])
        .arg(&path)
        .output()
        .expect("failed to run doa_cli replay");
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let diagnostics: Vec<&str> = stdout
        .lines()
        .filter(|line| line.starts_with("Azimuth:"))
        .collect();
    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.iter().all(|line| line.contains("degrees [")));
    assert!(stdout.contains("Frames processed: 3 (3 with inference)"));
    assert!(stdout.contains("Average CNN inference time (ms): N/A"));
}

#[test]
fn replay_rejects_missing_file() {
    let output = cli()
        .args(["replay", "--input", "/nonexistent/recording.wav"])
        .output()
        .expect("failed to run doa_cli replay");
    assert_eq!(output.status.code(), Some(1));
}
