//! Bridge configuration.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::audio::SAMPLE_RATE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Audio capture parameters
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (the decoder requires 16 kHz)
    pub sample_rate: u32,

    /// Channel count (the decoder requires mono)
    pub channels: u16,

    /// Frames per blocking read
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: 1,
            frame_size: 1024,
        }
    }
}

/// Configuration for the voice command bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Acoustic model directory handed to the decoder
    pub model_path: PathBuf,

    /// Pronunciation dictionary file
    pub lexicon_path: PathBuf,

    /// Keyword list file with per-phrase thresholds
    pub kwlist_path: PathBuf,

    /// Topic the velocity command is published on
    pub topic: String,

    /// Node identity registered with the middleware
    pub node_name: String,

    /// Baseline speed magnitude; also the speed-mode starting value
    pub base_speed: f64,

    /// Delay after the final zero-command publish, to allow delivery
    pub halt_settle: Duration,

    /// Audio capture parameters
    pub audio: AudioConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("/usr/share/pocketsphinx/model/hmm/en_US/hub4wsj_sc_8k"),
            lexicon_path: PathBuf::from("voice_cmd.dic"),
            kwlist_path: PathBuf::from("voice_cmd.kwlist"),
            topic: "mobile_base/commands/velocity".to_string(),
            node_name: "voice_cmd_vel".to_string(),
            base_speed: 0.2,
            halt_settle: Duration::from_secs(1),
            audio: AudioConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_speed.is_finite() && self.base_speed > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "base_speed must be positive, got {}",
                self.base_speed
            )));
        }

        if self.audio.frame_size == 0 {
            return Err(ConfigError::Invalid("frame_size must be > 0".to_string()));
        }

        if self.audio.sample_rate != SAMPLE_RATE {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be {} Hz",
                SAMPLE_RATE
            )));
        }

        if self.audio.channels != 1 {
            return Err(ConfigError::Invalid(
                "the decoder requires mono audio".to_string(),
            ));
        }

        if self.topic.is_empty() {
            return Err(ConfigError::Invalid("topic must not be empty".to_string()));
        }

        if self.node_name.is_empty() {
            return Err(ConfigError::Invalid(
                "node_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_speed, 0.2);
        assert_eq!(config.audio.frame_size, 1024);
        assert_eq!(config.topic, "mobile_base/commands/velocity");
        assert_eq!(config.node_name, "voice_cmd_vel");
    }

    #[test]
    fn test_rejects_bad_base_speed() {
        let mut config = BridgeConfig::default();
        config.base_speed = 0.0;
        assert!(config.validate().is_err());

        config.base_speed = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_audio_params() {
        let mut config = BridgeConfig::default();
        config.audio.frame_size = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.audio.sample_rate = 44_100;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.audio.channels = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_topic() {
        let mut config = BridgeConfig::default();
        config.topic = String::new();
        assert!(config.validate().is_err());
    }
}
