//! Integration tests for the voice command bridge.
//!
//! Drives the full read-decode-dispatch-publish cycle with synthetic audio
//! and in-memory collaborators, plus one pass over a real TCP rosbridge
//! endpoint.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voice_cmd_bridge::{
    AudioError, AudioSource, BridgeConfig, CommandPublisher, Decoder, DecoderError, Hypothesis,
    KeywordTable, PublishError, RosbridgePublisher, Segment, ShutdownFlag, Twist,
    VoiceCommandBridge, SAMPLE_RATE,
};

/// Generate a synthetic audio tone as 16-bit PCM
fn generate_tone(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let sample = amplitude * (2.0 * PI * frequency * t).sin();
            (sample * i16::MAX as f32) as i16
        })
        .collect()
}

/// Audio source backed by a fixed sample buffer, then end-of-stream
struct PlaybackSource {
    buffers: VecDeque<Vec<i16>>,
}

impl PlaybackSource {
    fn from_samples(samples: &[i16], chunk_size: usize) -> Self {
        Self {
            buffers: samples.chunks(chunk_size).map(|c| c.to_vec()).collect(),
        }
    }

    fn silence(buffer_count: usize, chunk_size: usize) -> Self {
        Self {
            buffers: (0..buffer_count).map(|_| vec![0i16; chunk_size]).collect(),
        }
    }
}

impl AudioSource for PlaybackSource {
    fn read_frames(&mut self, _count: usize) -> Result<Option<Vec<i16>>, AudioError> {
        Ok(self.buffers.pop_front())
    }
}

/// Decoder that never spots anything
struct SilentDecoder;

impl Decoder for SilentDecoder {
    fn start_utt(&mut self) -> Result<(), DecoderError> {
        Ok(())
    }

    fn process_raw(
        &mut self,
        _samples: &[i16],
        _no_search: bool,
        _full_utt: bool,
    ) -> Result<(), DecoderError> {
        Ok(())
    }

    fn end_utt(&mut self) -> Result<(), DecoderError> {
        Ok(())
    }

    fn hyp(&self) -> Option<Hypothesis> {
        None
    }

    fn seg(&self) -> Vec<Segment> {
        Vec::new()
    }
}

/// Publisher recording every command it is handed
#[derive(Clone, Default)]
struct RecordingPublisher {
    published: Arc<Mutex<Vec<Twist>>>,
}

impl CommandPublisher for RecordingPublisher {
    fn publish(&mut self, msg: &Twist) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(*msg);
        Ok(())
    }
}

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.halt_settle = Duration::ZERO;
    config
}

#[test]
fn test_publish_cadence_and_final_halt() {
    let publisher = RecordingPublisher::default();
    let published = publisher.published.clone();

    let mut bridge = VoiceCommandBridge::new(
        &test_config(),
        KeywordTable::builtin(),
        SilentDecoder,
        publisher,
    )
    .expect("Failed to create bridge");

    let mut audio = PlaybackSource::silence(12, 1024);
    let stats = bridge
        .run(&mut audio, &ShutdownFlag::new())
        .expect("Bridge run failed");

    assert_eq!(stats.buffers_read, 12);
    // One publish per buffer plus the final halt.
    assert_eq!(stats.commands_published, 13);

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 13);
    for msg in published.iter() {
        assert!(msg.is_zero());
    }
}

#[test]
fn test_preset_shutdown_publishes_exactly_one_zero() {
    let publisher = RecordingPublisher::default();
    let published = publisher.published.clone();

    let mut bridge = VoiceCommandBridge::new(
        &test_config(),
        KeywordTable::builtin(),
        SilentDecoder,
        publisher,
    )
    .expect("Failed to create bridge");

    let shutdown = ShutdownFlag::new();
    shutdown.set();

    let mut audio = PlaybackSource::silence(100, 1024);
    bridge.run(&mut audio, &shutdown).expect("Bridge run failed");

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0].is_zero());
}

#[test]
fn test_full_pipeline_over_rosbridge() {
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::mpsc;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let publisher = RosbridgePublisher::connect(&addr, "mobile_base/commands/velocity", "voice_cmd_vel")
        .expect("Failed to connect publisher");

    let mut bridge = VoiceCommandBridge::new(
        &test_config(),
        KeywordTable::builtin(),
        SilentDecoder,
        publisher,
    )
    .expect("Failed to create bridge");

    let mut audio = PlaybackSource::silence(3, 1024);
    bridge
        .run(&mut audio, &ShutdownFlag::new())
        .expect("Bridge run failed");
    drop(bridge);

    let mut ops = Vec::new();
    while let Ok(line) = rx.recv_timeout(Duration::from_secs(5)) {
        let op: serde_json::Value = serde_json::from_str(&line).unwrap();
        let done = op["op"] == "unadvertise";
        ops.push(op);
        if done {
            break;
        }
    }

    // advertise, 3 cycle publishes, the halt publish, unadvertise.
    assert_eq!(ops.len(), 6);
    assert_eq!(ops[0]["op"], "advertise");
    assert_eq!(ops[0]["type"], "geometry_msgs/Twist");
    for op in &ops[1..5] {
        assert_eq!(op["op"], "publish");
        assert_eq!(op["topic"], "mobile_base/commands/velocity");
        assert_eq!(op["msg"]["linear"]["x"], 0.0);
    }
    assert_eq!(ops[5]["op"], "unadvertise");
}

// The remaining tests exercise the mock engine, which only exists when the
// native decoder is not linked in.
#[cfg(not(feature = "sphinx"))]
mod mock_engine {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use voice_cmd_bridge::SphinxDecoder;

    fn kwlist_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_loud_audio_drives_the_robot() {
        // The mock engine spots the first keyphrase on sustained loud audio.
        let kwlist = kwlist_file("forward /1e-4/\nfull speed /1e-20/\n");
        let decoder = SphinxDecoder::new(
            std::path::Path::new("/nonexistent/model"),
            std::path::Path::new("/nonexistent/voice_cmd.dic"),
            kwlist.path(),
        )
        .expect("Failed to create decoder");

        let publisher = RecordingPublisher::default();
        let published = publisher.published.clone();

        let mut bridge = VoiceCommandBridge::new(
            &test_config(),
            KeywordTable::builtin(),
            decoder,
            publisher,
        )
        .expect("Failed to create bridge");

        // One second of a loud tone, fed in 1024-frame buffers.
        let tone = generate_tone(440.0, 1.0, 0.6);
        let mut audio = PlaybackSource::from_samples(&tone, 1024);

        bridge
            .run(&mut audio, &ShutdownFlag::new())
            .expect("Bridge run failed");

        let published = published.lock().unwrap();
        let moving: Vec<_> = published.iter().filter(|msg| !msg.is_zero()).collect();

        assert!(!moving.is_empty(), "expected the forward rule to fire");
        assert_relative_eq!(moving[0].linear.x, 0.2, epsilon = 1e-9);
        assert_relative_eq!(moving[0].angular.z, 0.0, epsilon = 1e-9);

        // The final publish is still the zero halt command.
        assert!(published.last().unwrap().is_zero());
    }

    #[test]
    fn test_quiet_audio_never_moves_the_robot() {
        let kwlist = kwlist_file("forward\n");
        let decoder = SphinxDecoder::new(
            std::path::Path::new("/nonexistent/model"),
            std::path::Path::new("/nonexistent/voice_cmd.dic"),
            kwlist.path(),
        )
        .expect("Failed to create decoder");

        let publisher = RecordingPublisher::default();
        let published = publisher.published.clone();

        let mut bridge = VoiceCommandBridge::new(
            &test_config(),
            KeywordTable::builtin(),
            decoder,
            publisher,
        )
        .expect("Failed to create bridge");

        // A quiet tone stays under the mock engine's energy gate.
        let tone = generate_tone(440.0, 1.0, 0.05);
        let mut audio = PlaybackSource::from_samples(&tone, 1024);

        bridge
            .run(&mut audio, &ShutdownFlag::new())
            .expect("Bridge run failed");

        for msg in published.lock().unwrap().iter() {
            assert!(msg.is_zero());
        }
    }

    #[test]
    fn test_missing_kwlist_fails_startup() {
        let result = SphinxDecoder::new(
            std::path::Path::new("/nonexistent/model"),
            std::path::Path::new("/nonexistent/voice_cmd.dic"),
            std::path::Path::new("/nonexistent/voice_cmd.kwlist"),
        );
        assert!(result.is_err());
    }
}
