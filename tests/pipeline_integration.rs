use std::sync::Arc;
use std::time::{Duration, Instant};

use doa_array::analysis::aggregator::Predictions;
use doa_array::analysis::gate::GateState;
use doa_array::config::{AppConfig, BackendKind, CHUNK};
use doa_array::engine::{EngineHandle, ReplaySource, SignalMonitor};
use doa_array::fixtures::{load_recording, write_recording};
use doa_array::testing::engines::ScriptedEngine;
use doa_array::testing::synth::{interleave_raw, noise_frame, PlaneWave, SynthConfig};
use doa_array::{Predictor, PredictorModels};

fn music_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.azimuth_backend = BackendKind::Music;
    config
}

fn wait_until_finished(handle: &EngineHandle) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn azimuth_of(predictions: &Predictions) -> u32 {
    match predictions {
        Predictions::Single { azimuth, .. } => azimuth.angle_deg,
        other => panic!("expected a single-source estimate, got {:?}", other),
    }
}

#[test]
fn recorded_session_replays_through_engine() {
    let wave = PlaneWave::new(300.0, SynthConfig::default());
    let mut frames: Vec<_> = (0..3).map(|i| wave.raw_frame_at(i, 11).unwrap()).collect();
    frames.extend((0..2).map(|i| interleave_raw(&noise_frame(CHUNK, 8, 40 + i)).unwrap()));

    let path = std::env::temp_dir().join(format!("doa_replay_{}.wav", std::process::id()));
    write_recording(&path, &frames).unwrap();
    let recording = load_recording(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(recording.frames.len(), 5);

    let config = music_config();
    let predictor = Predictor::new(&config, PredictorModels::default()).unwrap();
    let mut handle = EngineHandle::start(
        &config,
        predictor,
        Box::new(ReplaySource::new(recording.frames)),
        true,
    )
    .unwrap();
    wait_until_finished(&handle);

    // Two quiet frames are below the silence limit, the estimate is held
    let snapshot = handle.latest();
    assert_eq!(snapshot.frame_index, 5);
    assert_eq!(snapshot.gate_state, GateState::ListeningSilent);
    let azimuth = azimuth_of(&snapshot.predictions);
    assert!((298..=302).contains(&azimuth), "azimuth {}", azimuth);
    assert_eq!(snapshot.display.max_bucket, Some(30));

    let report = handle.stop().unwrap();
    assert!(report.failure.is_none());
    assert_eq!(report.summary.frames_processed, 5);
    assert_eq!(report.summary.frames_inferred, 3);
}

#[test]
fn classifier_session_reports_latency_per_backend() {
    let config = AppConfig::default();
    let predictor = Predictor::new(
        &config,
        PredictorModels {
            azimuth: Some(Box::new(ScriptedEngine::one_hot("azimuth", 360, 200, 0.75))),
            elevation: None,
        },
    )
    .unwrap();

    let wave = PlaneWave::new(45.0, SynthConfig::default());
    let frames = (0..3).map(|i| wave.raw_frame_at(i, 5).unwrap()).collect();
    let mut handle =
        EngineHandle::start(&config, predictor, Box::new(ReplaySource::new(frames)), true)
            .unwrap();
    wait_until_finished(&handle);

    let snapshot = handle.latest();
    assert_eq!(azimuth_of(&snapshot.predictions), 200);
    assert_eq!(
        snapshot.diagnostic.as_deref(),
        Some("Azimuth: 200 degrees [ 75.0%]")
    );

    let summary = handle.stop().unwrap().summary;
    assert!(summary.classifier_latency_ms.is_some());
    assert!(summary.music_latency_ms.is_none());
    let text = summary.to_string();
    assert!(text.contains("Average MUSIC inference time (ms): N/A"));
}

#[test]
fn monitor_sees_published_frames() {
    let config = music_config();
    let predictor = Predictor::new(&config, PredictorModels::default()).unwrap();
    let wave = PlaneWave::new(10.0, SynthConfig::default());
    let frames = (0..2).map(|i| wave.raw_frame_at(i, 1).unwrap()).collect();

    let mut handle = EngineHandle::start(
        &config,
        predictor,
        Box::new(ReplaySource::paced(frames, Duration::from_millis(50))),
        true,
    )
    .unwrap();
    let peaks = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&peaks);
    let monitor = SignalMonitor::spawn(
        handle.frames(),
        Duration::from_millis(2),
        move |_, frame| sink.lock().unwrap().push(frame.peak_abs()),
    );

    wait_until_finished(&handle);
    std::thread::sleep(Duration::from_millis(20));
    let shown = monitor.stop();
    handle.stop().unwrap();

    assert!(shown >= 1);
    assert!(peaks.lock().unwrap().iter().all(|&peak| peak > 50));
}
