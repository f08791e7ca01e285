use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{PiperError, Result};
use crate::{AudioFormat, LoadedVoice, ResolvedVoice, SentenceAudio, SynthesisEngine};

/// Longest silence accepted after a sentence, in seconds.
pub const MAX_SENTENCE_SILENCE: f32 = 60.0;

/// Per-request prosody and quality controls.
///
/// `None` means "use the voice's own default", not zero.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisParameters {
    /// Index into the voice's speakers
    pub speaker: u32,
    /// Phoneme duration multiplier; larger is slower
    #[builder(setter(strip_option))]
    pub length_scale: Option<f32>,
    /// Generator noise
    #[builder(setter(strip_option))]
    pub noise_scale: Option<f32>,
    /// Phoneme width noise
    #[builder(setter(strip_option))]
    pub noise_w: Option<f32>,
    /// Seconds of silence appended after each sentence
    pub sentence_silence: f32,
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self {
            speaker: 0,
            length_scale: None,
            noise_scale: None,
            noise_w: None,
            sentence_silence: 0.0,
        }
    }
}

impl SynthesisParameters {
    /// Parse parameters from JSON, rejecting options this crate does not know.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PiperError::InvalidParameter(e.to_string()))
    }

    /// Check that every value is usable with a voice of `num_speakers` speakers.
    pub fn validate(&self, num_speakers: u32) -> Result<()> {
        if self.speaker >= num_speakers.max(1) {
            return Err(PiperError::InvalidParameter(format!(
                "speaker {} out of range (voice has {num_speakers})",
                self.speaker
            )));
        }

        if let Some(length_scale) = self.length_scale {
            if !length_scale.is_finite() || length_scale <= 0.0 {
                return Err(PiperError::InvalidParameter(format!(
                    "length_scale must be positive, got {length_scale}"
                )));
            }
        }

        for (name, value) in [("noise_scale", self.noise_scale), ("noise_w", self.noise_w)] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(PiperError::InvalidParameter(format!(
                        "{name} must be non-negative, got {value}"
                    )));
                }
            }
        }

        if !self.sentence_silence.is_finite()
            || !(0.0..=MAX_SENTENCE_SILENCE).contains(&self.sentence_silence)
        {
            return Err(PiperError::InvalidParameter(format!(
                "sentence_silence must be between 0 and {MAX_SENTENCE_SILENCE} seconds, got {}",
                self.sentence_silence
            )));
        }

        Ok(())
    }
}

/// A loaded voice, reused across synthesis requests.
pub struct SynthesisSession<V> {
    voice: V,
    resolved: ResolvedVoice,
}

impl<V: LoadedVoice> SynthesisSession<V> {
    /// Load `resolved` with `engine`.
    pub fn load<E>(engine: &E, resolved: ResolvedVoice, use_accelerator: bool) -> Result<Self>
    where
        E: SynthesisEngine<Voice = V>,
    {
        log::debug!(
            "Loading voice {} (config {})",
            resolved.model.display(),
            resolved.config.display()
        );
        let voice = engine
            .load_voice(&resolved, use_accelerator)
            .map_err(PiperError::EngineLoad)?;
        Ok(Self { voice, resolved })
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.voice.audio_format()
    }

    pub fn resolved_voice(&self) -> &ResolvedVoice {
        &self.resolved
    }

    pub fn voice(&self) -> &V {
        &self.voice
    }

    /// Synthesize `text`, yielding audio blocks in order.
    ///
    /// Empty or whitespace-only text yields an empty sequence.
    pub fn synthesize(&mut self, text: &str, params: &SynthesisParameters) -> Result<Synthesis<'_>> {
        params.validate(self.voice.num_speakers())?;
        log::debug!("Input text length: {}", text.len());

        let format = self.voice.audio_format();
        let silence = silence_samples(params.sentence_silence, format)?;

        let sentences: SentenceAudio<'_> = if text.trim().is_empty() {
            Box::new(std::iter::empty())
        } else {
            self.voice
                .synthesize(text, params)
                .map_err(PiperError::Synthesis)?
        };

        Ok(Synthesis {
            format,
            sentences,
            silence,
        })
    }
}

/// Interleaved zero samples making up `seconds` of silence in `format`.
fn silence_samples(seconds: f32, format: AudioFormat) -> Result<usize> {
    let frames = (f64::from(seconds) * f64::from(format.sample_rate)).round();
    if !(0.0..=u32::MAX as f64).contains(&frames) {
        return Err(PiperError::InvalidParameter(format!(
            "sentence_silence of {seconds}s does not fit in a sample count"
        )));
    }

    (frames as usize)
        .checked_mul(usize::from(format.channels))
        .ok_or_else(|| {
            PiperError::InvalidParameter(format!(
                "sentence_silence of {seconds}s does not fit in a sample count"
            ))
        })
}

/// A single-pass sequence of audio blocks from one synthesis request.
pub struct Synthesis<'a> {
    format: AudioFormat,
    sentences: SentenceAudio<'a>,
    silence: usize,
}

impl Synthesis<'_> {
    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Iterator for Synthesis<'_> {
    type Item = Result<Vec<i16>>;

    fn next(&mut self) -> Option<Self::Item> {
        let silence = self.silence;
        self.sentences.next().map(|sentence| {
            let mut block = sentence.map_err(PiperError::Synthesis)?;
            let len = block.len().checked_add(silence).ok_or_else(|| {
                PiperError::InvalidParameter(format!("{silence} samples of silence overflow the block"))
            })?;
            block.resize(len, 0);
            Ok(block)
        })
    }
}
