//! Voice command bridge.
//!
//! The read-decode-dispatch-publish cycle: one blocking audio read per
//! iteration, one publish per successful read, and a guaranteed zero-velocity
//! publish on the way out so the robot is never left moving.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{AudioError, AudioSource};
use crate::config::BridgeConfig;
use crate::decoder::{Decoder, DecoderError};
use crate::keywords::KeywordTable;
use crate::publisher::{CommandPublisher, PublishError};
use crate::twist::Twist;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Cooperative shutdown flag shared with the signal handler
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported when the bridge stops
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeStats {
    pub buffers_read: u64,
    pub commands_published: u64,
    pub keywords_dispatched: u64,
}

/// Bridges keyword spots to a continuously republished velocity command.
///
/// Owns the mutable command and the speed mode; nothing else writes them.
pub struct VoiceCommandBridge<D, P> {
    decoder: D,
    publisher: P,
    table: KeywordTable,
    msg: Twist,
    speed: f64,
    base_speed: f64,
    frame_size: usize,
    halt_settle: Duration,
    stats: BridgeStats,
}

impl<D: Decoder, P: CommandPublisher> VoiceCommandBridge<D, P> {
    /// Build the bridge and open the first utterance.
    pub fn new(
        config: &BridgeConfig,
        table: KeywordTable,
        mut decoder: D,
        publisher: P,
    ) -> Result<Self, BridgeError> {
        decoder.start_utt()?;

        Ok(Self {
            decoder,
            publisher,
            table,
            msg: Twist::zero(),
            speed: config.base_speed,
            base_speed: config.base_speed,
            frame_size: config.audio.frame_size,
            halt_settle: config.halt_settle,
            stats: BridgeStats::default(),
        })
    }

    /// Run until shutdown or end-of-stream.
    ///
    /// The zero-velocity halt command is published on every exit path,
    /// including the error path.
    pub fn run(
        &mut self,
        audio: &mut dyn AudioSource,
        shutdown: &ShutdownFlag,
    ) -> Result<BridgeStats, BridgeError> {
        let result = self.pump(audio, shutdown);
        let halt = self.publish_halt();
        result.and(halt)?;
        Ok(self.stats)
    }

    fn pump(
        &mut self,
        audio: &mut dyn AudioSource,
        shutdown: &ShutdownFlag,
    ) -> Result<(), BridgeError> {
        while !shutdown.is_set() {
            let buf = match audio.read_frames(self.frame_size)? {
                Some(buf) if !buf.is_empty() => buf,
                _ => {
                    info!("Audio input ended");
                    return Ok(());
                }
            };

            self.stats.buffers_read += 1;
            self.decoder.process_raw(&buf, false, false)?;
            self.dispatch_and_publish()?;
        }

        info!("Shutdown requested");
        Ok(())
    }

    /// One dispatch-and-publish step: apply any spotted keyphrase to the
    /// command, then republish it whether or not anything fired.
    fn dispatch_and_publish(&mut self) -> Result<(), BridgeError> {
        if let Some(hyp) = self.decoder.hyp() {
            for seg in self.decoder.seg() {
                info!(
                    "segment '{}' prob={} frames={}..{}",
                    seg.word, seg.prob, seg.start_frame, seg.end_frame
                );
            }
            info!("Detected keyphrase '{}', restarting search", hyp.text);

            // Keyword search degrades after a match; a fresh utterance resets
            // it so the same phrase can fire again.
            self.decoder.end_utt()?;
            self.decoder.start_utt()?;

            let text = hyp.text.to_lowercase();
            let fired = self
                .table
                .apply(&text, &mut self.msg, &mut self.speed, self.base_speed);
            self.stats.keywords_dispatched += fired.len() as u64;
            for phrase in &fired {
                debug!(
                    "rule '{}' applied, command now linear.x={} angular.z={}",
                    phrase, self.msg.linear.x, self.msg.angular.z
                );
            }
        }

        self.publisher.publish(&self.msg)?;
        self.stats.commands_published += 1;
        Ok(())
    }

    /// Final safe-stop publish.
    fn publish_halt(&mut self) -> Result<(), BridgeError> {
        info!("Stopping: publishing zero velocity command");

        self.msg = Twist::zero();
        self.publisher.publish(&self.msg)?;
        self.stats.commands_published += 1;

        if !self.halt_settle.is_zero() {
            std::thread::sleep(self.halt_settle);
        }
        Ok(())
    }

    /// Current velocity command
    pub fn command(&self) -> &Twist {
        &self.msg
    }

    /// Current speed-mode value
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Counters so far
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }
}
