// DOA Array Core - direction-of-arrival estimation for a 6-mic circular array
// Real-time capture, lock-free frame hand-off and per-frame estimation

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod session;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use analysis::{FrameOutcome, Predictor, PredictorModels};
pub use config::{AppConfig, BackendKind, DeploymentMode};
pub use engine::{EngineHandle, FrameSource, ReplaySource, SessionReport};
pub use error::{AudioError, InferenceError, PipelineError};
pub use session::{PredictionSnapshot, SessionState, SessionSummary};

use std::sync::Once;

use tracing::Level;

static LOGGING: Once = Once::new();

/// Install the stderr subscriber at `info` (or `RUST_LOG` when it names a level)
pub fn init_logging() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    init_logging_with(level);
}

/// Install the stderr subscriber at `level`; later calls are no-ops
pub fn init_logging_with(level: Level) {
    LOGGING.call_once(|| {
        let installed = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
        if let Err(err) = installed {
            eprintln!("Logging already initialized: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging_with(Level::WARN);
        init_logging();
        tracing::info!(target: "doa::predictions", "[No prediction]");
        log::info!("bridged through tracing");
    }
}
