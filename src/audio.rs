//! Microphone capture.
//!
//! A cpal input stream writes into a lock-free ring buffer; the bridge pulls
//! fixed-size frames back out, blocking until enough samples arrive. The
//! capture callback never blocks on the reader: when the ring fills up the
//! oldest samples are dropped.

use cache_padded::CachePadded;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AudioConfig;

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// Sample rate required by the decoder
pub const SAMPLE_RATE: u32 = 16_000;

/// Ring capacity in seconds; slow loop iterations should not drop samples
const BUFFER_SECONDS: u32 = 4;

/// How long the reader sleeps between ring polls
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No input device available")]
    NoDevice,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Blocking source of fixed-size audio buffers.
///
/// `Ok(None)` signals end-of-stream and terminates the bridge loop.
pub trait AudioSource {
    fn read_frames(&mut self, count: usize) -> Result<Option<Vec<AudioSample>>, AudioError>;
}

type RingBuffer = HeapRb<AudioSample>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Ring buffer shared between the capture callback and the reader
struct CaptureBuffer {
    producer: CachePadded<Mutex<RingProducer>>,
    consumer: CachePadded<Mutex<RingConsumer>>,
    closed: AtomicBool,
}

impl CaptureBuffer {
    fn new(capacity: usize) -> Self {
        debug!("Creating capture buffer with capacity: {} samples", capacity);

        let rb = HeapRb::<AudioSample>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
            closed: AtomicBool::new(false),
        }
    }

    /// Write samples; the oldest are dropped when the ring is full
    fn write(&self, samples: &[AudioSample]) {
        let mut producer = self.producer.lock().unwrap();

        let vacant = producer.vacant_len();
        if samples.len() > vacant {
            let to_drop = samples.len() - vacant;
            let mut consumer = self.consumer.lock().unwrap();
            consumer.skip(to_drop);
            drop(consumer);

            warn!("Capture buffer full, dropping {} oldest samples", to_drop);
        }

        producer.push_slice(samples);
    }

    /// Pop exactly `count` samples, or `None` if fewer are buffered
    fn pop(&self, count: usize) -> Option<Vec<AudioSample>> {
        let mut consumer = self.consumer.lock().unwrap();
        if consumer.occupied_len() < count {
            return None;
        }

        let mut out = vec![0; count];
        let read = consumer.pop_slice(&mut out);
        out.truncate(read);
        Some(out)
    }

    fn len(&self) -> usize {
        self.consumer.lock().unwrap().occupied_len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Microphone-backed audio source
pub struct MicrophoneSource {
    buffer: Arc<CaptureBuffer>,
    // Dropping the stream stops capture.
    _stream: cpal::Stream,
}

impl MicrophoneSource {
    /// Open the default input device at the decoder's native format.
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "<unknown>".to_string())
        );

        // Check whether the device supports the requested format; cpal will
        // still try to open the stream either way.
        if let Ok(mut supported) = device.supported_input_configs() {
            let rate = cpal::SampleRate(config.sample_rate);
            let matches = supported.any(|range| {
                range.min_sample_rate() <= rate
                    && range.max_sample_rate() >= rate
                    && range.channels() == config.channels
            });
            if !matches {
                warn!(
                    "Device does not advertise {} Hz mono, the stream may not open",
                    config.sample_rate
                );
            }
        }

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (config.sample_rate * BUFFER_SECONDS) as usize;
        let buffer = Arc::new(CaptureBuffer::new(capacity));
        let writer = buffer.clone();
        let err_buffer = buffer.clone();
        let err_fn = move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            err_buffer.close();
        };

        let sample_format = device
            .default_input_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?
            .sample_format();

        let stream = match sample_format {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &_| writer.write(data),
                err_fn,
                None,
            ),
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &_| {
                    let samples: Vec<AudioSample> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    writer.write(&samples);
                },
                err_fn,
                None,
            ),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
        debug!("Capture stream running at {} Hz", config.sample_rate);

        Ok(Self {
            buffer,
            _stream: stream,
        })
    }
}

impl AudioSource for MicrophoneSource {
    fn read_frames(&mut self, count: usize) -> Result<Option<Vec<AudioSample>>, AudioError> {
        loop {
            if let Some(samples) = self.buffer.pop(count) {
                return Ok(Some(samples));
            }

            // A closed stream with less than one buffer left is end-of-stream.
            if self.buffer.is_closed() && self.buffer.len() < count {
                return Ok(None);
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
