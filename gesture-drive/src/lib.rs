//! Gesture drive library
//!
//! Turns a stream of body-pose landmark frames into drive commands for a
//! remote vehicle: a palms-together hold cycles the operating mode, a raised
//! toe drives forward, a raised wrist steers, and each command is sent as a
//! best-effort UDP datagram.

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod landmarks;
pub mod mode;
pub mod pipeline;
pub mod source;

// Re-export main types
pub use classifier::{
    ClassifierConfig, ClassifierError, Command, DriveTag, GestureClassifier, Side,
    TurnSensitivity,
};
pub use config::{ConfigError, DriveConfig};
pub use dispatcher::{CommandDispatcher, CommandSink, DispatchError, DispatchStats, DispatcherConfig};
pub use landmarks::{FrameBuilder, FrameError, Landmark, LandmarkFrame, PoseJoint, COORDINATE_SCALE};
pub use mode::{ModeChange, ModeController, OperatingMode, ToggleConfig, ToggleState};
pub use pipeline::{FrameOutcome, GesturePipeline, PipelineError, PipelineHandle, PipelineStats};
pub use source::{FrameSource, JsonLinesSource, SourceError, TimedFrame};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_drive=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_library_exports() {
        let _config = DriveConfig::default();
        let _classifier = GestureClassifier::default();
        let _controller = ModeController::new();
        assert_eq!(OperatingMode::default(), OperatingMode::Off);
    }
}
