use std::path::PathBuf;

use crate::{
    AudioFormat, BoxError, LoadedVoice, ResolvedVoice, SentenceAudio, SynthesisEngine,
    SynthesisParameters,
};

use super::config::PiperConfig;
use super::model::{audio_float_to_int16, PiperModel, Scales};
use super::phonemizer::{phoneme_ids, phonemize_sentences, split_sentences, EspeakConfig};

/// Piper text-to-speech engine.
///
/// Loads Piper VITS voices (`.onnx` + `.onnx.json`) and synthesizes them
/// with ONNX Runtime. Requires espeak-ng for phonemization.
///
/// # Quick Start
///
/// ```rust,no_run
/// use piper_synth::engines::piper::PiperEngine;
/// use piper_synth::{ResolvedVoice, SynthesisEngine, SynthesisSession, SynthesisParameters};
///
/// let voice = ResolvedVoice {
///     model: "voices/en_US-lessac-medium.onnx".into(),
///     config: "voices/en_US-lessac-medium.onnx.json".into(),
/// };
/// let mut session = SynthesisSession::load(&PiperEngine::new(), voice, false)?;
/// let blocks = session.synthesize("Hello, world!", &SynthesisParameters::default())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PiperEngine {
    espeak: EspeakConfig,
    num_threads: Option<usize>,
}

impl PiperEngine {
    /// Create an engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with explicit espeak-ng binary and data paths.
    ///
    /// Either path can be `None` to fall back to the system default.
    pub fn with_espeak(bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        Self {
            espeak: EspeakConfig {
                bin_path,
                data_path,
            },
            num_threads: None,
        }
    }

    /// Limit ONNX Runtime to `threads` intra- and inter-op threads.
    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }
}

impl SynthesisEngine for PiperEngine {
    type Voice = PiperVoice;

    fn load_voice(&self, voice: &ResolvedVoice, use_accelerator: bool) -> Result<PiperVoice, BoxError> {
        let config = PiperConfig::load(&voice.config)?;
        let model = PiperModel::load(&voice.model, self.num_threads, use_accelerator)?;

        Ok(PiperVoice {
            model,
            config,
            espeak: self.espeak.clone(),
        })
    }
}

/// A Piper voice ready for synthesis.
pub struct PiperVoice {
    model: PiperModel,
    config: PiperConfig,
    espeak: EspeakConfig,
}

impl PiperVoice {
    pub fn config(&self) -> &PiperConfig {
        &self.config
    }
}

impl LoadedVoice for PiperVoice {
    fn audio_format(&self) -> AudioFormat {
        self.config.audio_format()
    }

    fn num_speakers(&self) -> u32 {
        self.config.num_speakers
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParameters,
    ) -> Result<SentenceAudio<'_>, BoxError> {
        let sentences = split_sentences(text);
        let phonemes = phonemize_sentences(&sentences, &self.config.espeak.voice, &self.espeak)?;

        let defaults = self.config.inference;
        let scales = Scales {
            noise_scale: params.noise_scale.unwrap_or(defaults.noise_scale),
            length_scale: params.length_scale.unwrap_or(defaults.length_scale),
            noise_w: params.noise_w.unwrap_or(defaults.noise_w),
        };
        let speaker_id = i64::from(params.speaker);

        let Self { model, config, .. } = self;
        Ok(Box::new(phonemes.into_iter().map(move |phonemes| -> Result<Vec<i16>, BoxError> {
            log::debug!("Synthesizing phonemes: {phonemes}");
            let ids = phoneme_ids(config, &phonemes);
            let audio = model.infer(&ids, speaker_id, scales)?;
            Ok(audio_float_to_int16(&audio))
        })))
    }
}
