//! Keyword-spotting decoder.
//!
//! Wraps PocketSphinx keyword search behind a narrow trait: start an
//! utterance, feed raw 16-bit mono audio, end the utterance, and query the
//! current hypothesis. The real engine sits behind the `sphinx` cargo feature
//! (it links the native library); without it a mock engine keeps the bridge
//! and its tests runnable.

use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Decoder initialization failed: {0}")]
    Init(String),

    #[error("Keyword list error: {0}")]
    Kwlist(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Recognized keyphrase for the current utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Recognized keyphrase text
    pub text: String,

    /// Path score reported by the search
    pub score: i32,
}

/// One recognized segment with timing metadata (diagnostic only)
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub word: String,
    pub prob: i32,
    pub start_frame: i32,
    pub end_frame: i32,
}

/// Narrow surface of the speech decoder consumed by the bridge
pub trait Decoder {
    /// Begin a new utterance (resets the keyword search window)
    fn start_utt(&mut self) -> Result<(), DecoderError>;

    /// Feed one buffer of 16-bit mono samples
    fn process_raw(
        &mut self,
        samples: &[i16],
        no_search: bool,
        full_utt: bool,
    ) -> Result<(), DecoderError>;

    /// End the current utterance
    fn end_utt(&mut self) -> Result<(), DecoderError>;

    /// Current hypothesis, if a keyphrase has been spotted
    fn hyp(&self) -> Option<Hypothesis>;

    /// Recognized segments for the current hypothesis
    fn seg(&self) -> Vec<Segment>;
}

/// One keyword-list entry: a phrase and its detection threshold
#[derive(Debug, Clone, PartialEq)]
pub struct KwlistEntry {
    pub phrase: String,
    pub threshold: Option<f64>,
}

/// Parse a keyword list: one phrase per line with an optional `/1e-20/`
/// threshold; `#` comments and blank lines are ignored.
pub fn parse_kwlist(contents: &str) -> Result<Vec<KwlistEntry>, DecoderError> {
    let mut entries = Vec::new();

    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (phrase, threshold) = match line.find('/') {
            Some(idx) => {
                let value = line[idx..].trim().trim_matches('/').trim();
                let threshold = value.parse::<f64>().map_err(|_| {
                    DecoderError::Kwlist(format!(
                        "line {}: bad threshold '{}'",
                        lineno + 1,
                        value
                    ))
                })?;
                (line[..idx].trim(), Some(threshold))
            }
            None => (line, None),
        };

        if phrase.is_empty() {
            return Err(DecoderError::Kwlist(format!(
                "line {}: empty phrase",
                lineno + 1
            )));
        }

        entries.push(KwlistEntry {
            phrase: phrase.to_lowercase(),
            threshold,
        });
    }

    if entries.is_empty() {
        return Err(DecoderError::Kwlist("no keyphrases defined".to_string()));
    }

    Ok(entries)
}

/// Read and parse a keyword list file
pub fn load_kwlist(path: &Path) -> Result<Vec<KwlistEntry>, DecoderError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| DecoderError::Kwlist(format!("{}: {}", path.display(), e)))?;
    parse_kwlist(&contents)
}

// Real PocketSphinx engine
#[cfg(feature = "sphinx")]
mod real_impl {
    use super::*;
    use pocketsphinx::{CmdLn, PsDecoder};

    /// PocketSphinx-backed keyword spotter
    pub struct SphinxDecoder {
        ps: PsDecoder,
    }

    impl SphinxDecoder {
        /// Initialize the decoder in keyword-search mode.
        ///
        /// Invalid model, dictionary, or keyword-list paths surface here as
        /// initialization errors; there is no degraded mode.
        pub fn new(model: &Path, lexicon: &Path, kwlist: &Path) -> Result<Self, DecoderError> {
            // Check the keyword list up front for a readable error instead of
            // a C-level log dump.
            load_kwlist(kwlist)?;

            let hmm = model.to_string_lossy();
            let dict = lexicon.to_string_lossy();
            let kws = kwlist.to_string_lossy();
            let config = CmdLn::init(
                true,
                &[
                    "voice-cmd-bridge",
                    "-hmm",
                    hmm.as_ref(),
                    "-dict",
                    dict.as_ref(),
                    "-kws",
                    kws.as_ref(),
                    "-logfn",
                    "/dev/null",
                ],
            )
            .map_err(|e| DecoderError::Init(format!("{:?}", e)))?;

            let ps = PsDecoder::init(config);
            info!("PocketSphinx decoder initialized, model {}", model.display());

            Ok(Self { ps })
        }
    }

    impl Decoder for SphinxDecoder {
        fn start_utt(&mut self) -> Result<(), DecoderError> {
            self.ps
                .start_utt(None)
                .map_err(|e| DecoderError::Decode(format!("{:?}", e)))
        }

        fn process_raw(
            &mut self,
            samples: &[i16],
            no_search: bool,
            full_utt: bool,
        ) -> Result<(), DecoderError> {
            self.ps
                .process_raw(samples, no_search, full_utt)
                .map(|_| ())
                .map_err(|e| DecoderError::Decode(format!("{:?}", e)))
        }

        fn end_utt(&mut self) -> Result<(), DecoderError> {
            self.ps
                .end_utt()
                .map_err(|e| DecoderError::Decode(format!("{:?}", e)))
        }

        fn hyp(&self) -> Option<Hypothesis> {
            self.ps.get_hyp().map(|(text, _utt_id, score)| Hypothesis {
                text: text.to_lowercase(),
                score,
            })
        }

        fn seg(&self) -> Vec<Segment> {
            // The binding does not expose frame-level segments; report the
            // hypothesis as a single span.
            match self.hyp() {
                Some(hyp) => vec![Segment {
                    word: hyp.text,
                    prob: hyp.score,
                    start_frame: 0,
                    end_frame: 0,
                }],
                None => Vec::new(),
            }
        }
    }
}

// Mock engine for builds without the native library
#[cfg(not(feature = "sphinx"))]
mod mock_impl {
    use super::*;
    use tracing::warn;

    /// Samples per decoder frame (10 ms at 16 kHz)
    const SAMPLES_PER_FRAME: usize = 160;

    /// Normalized RMS above which a buffer counts as loud
    const SPOT_RMS_THRESHOLD: f64 = 0.3;

    /// Consecutive loud buffers required before a spot fires
    const SPOT_BUFFERS_REQUIRED: u32 = 3;

    /// Fixed path score attached to mock hypotheses
    const MOCK_SCORE: i32 = -1500;

    /// Mock keyword spotter used when the `sphinx` feature is disabled.
    ///
    /// Reports the first keyphrase of the keyword list after a run of
    /// sustained high-energy buffers, once per utterance. It exists so the
    /// default build runs end to end; it is not a recognizer.
    pub struct SphinxDecoder {
        keyphrases: Vec<KwlistEntry>,
        in_utt: bool,
        pending: Option<Hypothesis>,
        frames_fed: i32,
        loud_run: u32,
        run_start_frame: i32,
        spot_frames: Option<(i32, i32)>,
    }

    impl SphinxDecoder {
        /// Initialize the mock engine.
        ///
        /// The keyword list must load (that failure mode is shared with the
        /// real engine); missing model or dictionary paths only warn since
        /// the mock does not read them.
        pub fn new(model: &Path, lexicon: &Path, kwlist: &Path) -> Result<Self, DecoderError> {
            let keyphrases = load_kwlist(kwlist)?;

            warn!("Using MOCK decoder engine (sphinx feature not enabled)");
            if !model.exists() {
                warn!("Acoustic model not found: {}", model.display());
            }
            if !lexicon.exists() {
                warn!("Pronunciation dictionary not found: {}", lexicon.display());
            }
            info!(
                "Mock decoder loaded {} keyphrases from {}",
                keyphrases.len(),
                kwlist.display()
            );

            Ok(Self {
                keyphrases,
                in_utt: false,
                pending: None,
                frames_fed: 0,
                loud_run: 0,
                run_start_frame: 0,
                spot_frames: None,
            })
        }

        fn rms(samples: &[i16]) -> f64 {
            if samples.is_empty() {
                return 0.0;
            }
            let energy: f64 = samples
                .iter()
                .map(|&s| {
                    let normalized = s as f64 / i16::MAX as f64;
                    normalized * normalized
                })
                .sum();
            (energy / samples.len() as f64).sqrt()
        }
    }

    impl Decoder for SphinxDecoder {
        fn start_utt(&mut self) -> Result<(), DecoderError> {
            if self.in_utt {
                return Err(DecoderError::Decode("utterance already open".to_string()));
            }
            self.in_utt = true;
            self.pending = None;
            self.spot_frames = None;
            self.loud_run = 0;
            Ok(())
        }

        fn process_raw(
            &mut self,
            samples: &[i16],
            no_search: bool,
            _full_utt: bool,
        ) -> Result<(), DecoderError> {
            if !self.in_utt {
                return Err(DecoderError::Decode("no open utterance".to_string()));
            }

            self.frames_fed += (samples.len() / SAMPLES_PER_FRAME) as i32;

            if no_search || self.pending.is_some() {
                return Ok(());
            }

            if Self::rms(samples) > SPOT_RMS_THRESHOLD {
                if self.loud_run == 0 {
                    self.run_start_frame = self.frames_fed;
                }
                self.loud_run += 1;
            } else {
                self.loud_run = 0;
            }

            if self.loud_run >= SPOT_BUFFERS_REQUIRED {
                let phrase = self.keyphrases[0].phrase.clone();
                self.pending = Some(Hypothesis {
                    text: phrase,
                    score: MOCK_SCORE,
                });
                self.spot_frames = Some((self.run_start_frame, self.frames_fed));
            }

            Ok(())
        }

        fn end_utt(&mut self) -> Result<(), DecoderError> {
            if !self.in_utt {
                return Err(DecoderError::Decode("no open utterance".to_string()));
            }
            self.in_utt = false;
            Ok(())
        }

        fn hyp(&self) -> Option<Hypothesis> {
            self.pending.clone()
        }

        fn seg(&self) -> Vec<Segment> {
            match (&self.pending, self.spot_frames) {
                (Some(hyp), Some((start, end))) => vec![Segment {
                    word: hyp.text.clone(),
                    prob: hyp.score,
                    start_frame: start,
                    end_frame: end,
                }],
                _ => Vec::new(),
            }
        }
    }
}

#[cfg(feature = "sphinx")]
pub use real_impl::SphinxDecoder;

#[cfg(not(feature = "sphinx"))]
pub use mock_impl::SphinxDecoder;
