use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use doa_array::analysis::model::DenseModel;
use doa_array::config::{AppConfig, BackendKind, DeploymentMode, CHUNK, SAMPLE_RATE};
use doa_array::engine::{EngineHandle, FrameSource, ReplaySource, ReportReceiver, SessionReport};
use doa_array::fixtures::load_recording;
use doa_array::session::{PredictionSnapshot, SessionState};
use doa_array::testing::synth::{PlaneWave, SynthConfig};
use doa_array::{Predictor, PredictorModels};

#[derive(Parser, Debug)]
#[command(
    name = "doa_cli",
    about = "Direction-of-arrival estimation for the 6-mic circular array"
)]
struct Cli {
    /// JSON configuration file (defaults apply when missing)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log pipeline lifecycle at info level on stderr
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// Azimuth classifier (dense JSON model)
    #[arg(long)]
    azimuth_model: Option<PathBuf>,
    /// Elevation classifier (dense JSON model, single-source mode only)
    #[arg(long)]
    elevation_model: Option<PathBuf>,
    /// Override the configured azimuth backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Override the configured deployment mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Print one JSON snapshot per line instead of diagnostic lines
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum BackendArg {
    Classifier,
    Music,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Single,
    Multi,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a multichannel WAV recording through the pipeline
    Replay {
        #[arg(long)]
        input: PathBuf,
        /// Feed frames at the capture rate through the engine threads
        #[arg(long)]
        realtime: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Synthesize a plane wave from a chosen azimuth and locate it
    Simulate {
        #[arg(long, default_value_t = 90.0)]
        azimuth: f64,
        #[arg(long, default_value_t = 4)]
        frames: u64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Estimate from the live array for a fixed duration
    #[cfg(feature = "live")]
    Live {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Input device name (substring match), overrides the config
        #[arg(long)]
        device: Option<String>,
        /// Print the first sample of every microphone for each frame
        #[arg(long)]
        monitor: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// List capture devices
    #[cfg(feature = "live")]
    Devices,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    doa_array::init_logging_with(level);

    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Replay {
            input,
            realtime,
            pipeline,
        } => run_replay(config, &input, realtime, &pipeline),
        Commands::Simulate {
            azimuth,
            frames,
            seed,
            pipeline,
        } => run_simulate(config, azimuth, frames, seed, &pipeline),
        #[cfg(feature = "live")]
        Commands::Live {
            seconds,
            device,
            monitor,
            pipeline,
        } => run_live(config, seconds, device, monitor, &pipeline),
        #[cfg(feature = "live")]
        Commands::Devices => run_devices(),
    }
}

fn apply_overrides(mut config: AppConfig, args: &PipelineArgs) -> AppConfig {
    if let Some(backend) = args.backend {
        config.pipeline.azimuth_backend = match backend {
            BackendArg::Classifier => BackendKind::Classifier,
            BackendArg::Music => BackendKind::Music,
        };
    }
    if let Some(mode) = args.mode {
        config.pipeline.mode = match mode {
            ModeArg::Single => DeploymentMode::SingleSource,
            ModeArg::Multi => DeploymentMode::MultiSource,
        };
    }
    // Without a classifier the only usable backend is MUSIC
    if args.azimuth_model.is_none() {
        config.pipeline.azimuth_backend = BackendKind::Music;
    }
    config
}

fn load_model(path: &Path) -> Result<DenseModel> {
    DenseModel::load(path).with_context(|| format!("loading model {}", path.display()))
}

fn build_predictor(config: &AppConfig, args: &PipelineArgs) -> Result<Predictor> {
    let mut models = PredictorModels::default();
    if let Some(path) = &args.azimuth_model {
        models.azimuth = Some(Box::new(load_model(path)?));
    }
    if let Some(path) = &args.elevation_model {
        models.elevation = Some(Box::new(load_model(path)?));
    }
    Predictor::new(config, models).context("initializing predictor")
}

fn print_snapshot(snapshot: &PredictionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else if let Some(line) = &snapshot.diagnostic {
        println!("{}", line);
    }
    Ok(())
}

fn finish(report: SessionReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string(&report.summary)?);
    } else {
        println!("{}", report.summary);
    }
    match report.failure {
        Some(err) => {
            eprintln!("Session ended early: {}", err);
            Ok(ExitCode::from(2))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

fn frame_period() -> Duration {
    Duration::from_secs_f64(CHUNK as f64 / SAMPLE_RATE as f64)
}

fn run_replay(
    config: AppConfig,
    input: &Path,
    realtime: bool,
    args: &PipelineArgs,
) -> Result<ExitCode> {
    let config = apply_overrides(config, args);
    let recording = load_recording(input)?;
    let predictor = build_predictor(&config, args)?;

    if realtime {
        let source = ReplaySource::paced(recording.frames, frame_period());
        return run_engine(&config, predictor, Box::new(source), None, args.json);
    }

    let mut predictor = predictor;
    let mut session = SessionState::new(config.telemetry.latency_window);
    session.is_active = true;
    for frame in &recording.frames {
        let outcome = match predictor.process_frame(&mut session, frame) {
            Ok(outcome) => outcome,
            Err(err) => {
                return finish(
                    SessionReport {
                        summary: session.summary(),
                        failure: Some(err),
                    },
                    args.json,
                )
            }
        };
        print_snapshot(&session.snapshot(outcome.diagnostic), args.json)?;
    }

    finish(
        SessionReport {
            summary: session.summary(),
            failure: None,
        },
        args.json,
    )
}

fn run_simulate(
    config: AppConfig,
    azimuth: f64,
    frames: u64,
    seed: u64,
    args: &PipelineArgs,
) -> Result<ExitCode> {
    let config = apply_overrides(config, args);
    let wave = PlaneWave::new(azimuth.rem_euclid(360.0), SynthConfig::default());
    let frames = (0..frames)
        .map(|index| wave.raw_frame_at(index, seed.wrapping_add(index)))
        .collect::<Result<Vec<_>, _>>()
        .context("synthesizing frames")?;

    let predictor = build_predictor(&config, args)?;
    run_engine(
        &config,
        predictor,
        Box::new(ReplaySource::new(frames)),
        None,
        args.json,
    )
}

/// Drive a source through the engine and print every frame's snapshot
fn run_engine(
    config: &AppConfig,
    predictor: Predictor,
    source: Box<dyn FrameSource>,
    deadline: Option<Instant>,
    json: bool,
) -> Result<ExitCode> {
    let (mut handle, mut reports) = EngineHandle::start_reporting(config, predictor, source, true)?;

    loop {
        let finished = handle.is_finished();
        print_reports(&mut reports, json)?;
        let expired = deadline.map_or(false, |d| Instant::now() >= d);
        if finished || expired {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let report = handle.stop()?;
    // The worker has exited; whatever it queued is still waiting
    print_reports(&mut reports, json)?;
    if handle.frames_dropped() > 0 {
        eprintln!("{} frames dropped", handle.frames_dropped());
    }
    finish(report, json)
}

fn print_reports(reports: &mut ReportReceiver, json: bool) -> Result<()> {
    while let Ok(snapshot) = reports.try_recv() {
        print_snapshot(&snapshot, json)?;
    }
    Ok(())
}

#[cfg(feature = "live")]
fn run_live(
    config: AppConfig,
    seconds: u64,
    device: Option<String>,
    monitor: bool,
    args: &PipelineArgs,
) -> Result<ExitCode> {
    use doa_array::audio::CpalCapture;
    use doa_array::engine::monitor::{format_frame_line, SignalMonitor};

    let config = apply_overrides(config, args);
    let predictor = build_predictor(&config, args)?;
    let device = device.or_else(|| config.audio.input_device.clone());
    let source = CpalCapture::new(device);

    let deadline = Instant::now() + Duration::from_secs(seconds);
    if !monitor {
        return run_engine(&config, predictor, Box::new(source), Some(deadline), args.json);
    }

    let (mut handle, mut reports) =
        EngineHandle::start_reporting(&config, predictor, Box::new(source), true)?;
    let signal = SignalMonitor::spawn(handle.frames(), frame_period(), |index, frame| {
        println!("{}", format_frame_line(index, frame));
    });
    while Instant::now() < deadline && !handle.is_finished() {
        print_reports(&mut reports, args.json)?;
        thread::sleep(Duration::from_millis(50));
    }
    let shown = signal.stop();
    let report = handle.stop()?;
    print_reports(&mut reports, args.json)?;
    eprintln!("{} frames shown", shown);
    finish(report, args.json)
}

#[cfg(feature = "live")]
fn run_devices() -> Result<ExitCode> {
    let devices = doa_array::audio::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for (index, name) in devices.iter().enumerate() {
        println!("{:>2}: {}", index, name);
    }
    Ok(ExitCode::SUCCESS)
}
