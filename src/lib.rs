//! # piper-synth
//!
//! A Rust library that turns a Piper voice identifier and some text into a WAV file.
//!
//! ## Features
//!
//! - **Voice resolution**: accepts a model path, a catalog key or an alias and
//!   downloads missing voices from the Piper voice catalog into a local cache
//! - **Synthesis sessions**: load a voice once, synthesize many requests with
//!   per-call prosody parameters
//! - **WAV output**: write to a file, a fresh file inside a directory, or stdout
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-synth = { version = "2026.10", features = ["piper"] }
//! ```
//!
//! ```ignore
//! use piper_synth::{engines::piper::PiperEngine, OutputTarget, PiperSynthesizer, SynthesisParameters};
//! use piper_synth::SynthesizerConfigBuilder;
//!
//! let config = SynthesizerConfigBuilder::default()
//!     .model("en_US-lessac-medium")
//!     .data_dir("voices")
//!     .build()?;
//! let mut synth = PiperSynthesizer::new(&config, PiperEngine::new())?;
//!
//! let written = synth.synthesize_speech(
//!     "Hello, world!",
//!     &OutputTarget::file("output.wav"),
//!     &SynthesisParameters::default(),
//! )?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod engines;
pub mod error;
pub mod session;
pub mod synthesizer;
pub mod voices;

#[cfg(test)]
mod test_support;

pub use audio::{AudioSink, OutputTarget};
pub use error::{BoxError, PiperError, Result};
pub use session::{Synthesis, SynthesisParameters, SynthesisParametersBuilder, SynthesisSession};
pub use synthesizer::{PiperSynthesizer, SynthesizerConfig, SynthesizerConfigBuilder};
pub use voices::{ResolvedVoice, VoiceRequest, VoiceRequestBuilder, VoiceResolver};

/// Sample layout of the audio produced by a loaded voice.
///
/// Samples are always signed 16-bit PCM, interleaved when `channels > 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second, per channel (22050 for most Piper voices)
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    pub(crate) fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Audio for one sentence, as interleaved 16-bit samples.
pub type SentenceAudio<'a> = Box<dyn Iterator<Item = Result<Vec<i16>, BoxError>> + 'a>;

/// A voice that has been loaded by a [`SynthesisEngine`].
///
/// A loaded voice is synthesized from through `&mut self`, so a single voice
/// never runs two synthesis calls at once.
pub trait LoadedVoice {
    /// Output format of every sequence this voice produces.
    fn audio_format(&self) -> AudioFormat;

    /// Number of speakers the voice was trained with.
    fn num_speakers(&self) -> u32 {
        1
    }

    /// Synthesize speech, yielding one audio block per sentence in order.
    ///
    /// The returned sequence is single-pass; call again for a fresh one.
    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParameters,
    ) -> Result<SentenceAudio<'_>, BoxError>;
}

/// Common interface for text-to-speech synthesis engines.
///
/// An engine turns a resolved (model, config) pair into a [`LoadedVoice`].
pub trait SynthesisEngine {
    /// Handle to a loaded voice
    type Voice: LoadedVoice;

    /// Load the voice files, optionally on an accelerator.
    fn load_voice(&self, voice: &ResolvedVoice, use_accelerator: bool)
        -> Result<Self::Voice, BoxError>;
}
