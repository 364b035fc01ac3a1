//! Voice command bridge: keyword-spotting speech control for a mobile robot.
//!
//! Listens to the microphone, runs keyword spotting over the stream, and
//! republishes a velocity command every audio cycle, mutating it whenever a
//! keyphrase fires. The final publish on any exit path is always a zero
//! command so the robot is never left moving unattended.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod decoder;
pub mod keywords;
pub mod publisher;
pub mod twist;

// Re-export main types
pub use audio::{AudioError, AudioSample, AudioSource, MicrophoneSource, SAMPLE_RATE};
pub use bridge::{BridgeError, BridgeStats, ShutdownFlag, VoiceCommandBridge};
pub use config::{AudioConfig, BridgeConfig, ConfigError};
pub use decoder::{Decoder, DecoderError, Hypothesis, KwlistEntry, Segment, SphinxDecoder};
pub use keywords::{KeywordAction, KeywordRule, KeywordTable, TableError};
pub use publisher::{CommandPublisher, PublishError, RosbridgePublisher};
pub use twist::{Twist, Vector3};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_cmd_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
