use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::Deserialize;

use crate::audio::{AudioSink, OutputTarget};
use crate::error::{PiperError, Result};
use crate::session::{SynthesisParameters, SynthesisSession};
use crate::voices::{HttpCatalog, VoiceRequest, VoiceResolver, DEFAULT_CATALOG_URL};
use crate::{LoadedVoice, SynthesisEngine};

/// Everything needed to pick and load a voice.
///
/// Can be built in code with [`SynthesizerConfigBuilder`] or read from a
/// JSON file with [`SynthesizerConfig::from_json_file`].
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[builder(setter(into))]
#[serde(deny_unknown_fields)]
pub struct SynthesizerConfig {
    /// Model path, catalog key or alias
    pub model: String,
    /// Config for a model given by path; defaults to `<model>.json`
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub config: Option<PathBuf>,
    /// Directory searched for voices; defaults to the current directory
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Directory voices are downloaded into; defaults to `data_dir`
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[builder(default)]
    #[serde(default)]
    pub use_accelerator: bool,
    /// Refresh the cached voice catalog before resolving
    #[builder(default)]
    #[serde(default)]
    pub update_voices: bool,
    #[builder(default)]
    #[serde(default)]
    pub debug: bool,
    #[builder(default = "DEFAULT_CATALOG_URL.to_string()")]
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

impl SynthesizerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| PiperError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// The voice resolution request this config describes.
    pub fn voice_request(&self) -> VoiceRequest {
        VoiceRequest {
            identifier: self.model.clone(),
            config: self.config.clone(),
            search_dirs: self.data_dir.iter().cloned().collect(),
            download_dir: self.download_dir.clone().or_else(|| self.data_dir.clone()),
            refresh_catalog: self.update_voices,
        }
    }

    /// Log level an application should install for this config.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

/// Resolves a voice once, then turns text into WAV output on demand.
///
/// # Example
///
/// ```ignore
/// use piper_synth::{OutputTarget, PiperSynthesizer, SynthesisParameters, SynthesizerConfigBuilder};
/// use piper_synth::engines::piper::PiperEngine;
///
/// let config = SynthesizerConfigBuilder::default().model("en_US-lessac-medium").build()?;
/// let mut synth = PiperSynthesizer::new(&config, PiperEngine::new())?;
/// synth.synthesize_speech("Hi.", &OutputTarget::directory("out"), &SynthesisParameters::default())?;
/// ```
pub struct PiperSynthesizer<V> {
    session: SynthesisSession<V>,
    sink: AudioSink,
}

impl<V: LoadedVoice> PiperSynthesizer<V> {
    /// Resolve the configured voice against `config.catalog_url` and load it.
    pub fn new<E>(config: &SynthesizerConfig, engine: E) -> Result<Self>
    where
        E: SynthesisEngine<Voice = V>,
    {
        let resolver = VoiceResolver::new(HttpCatalog::new(config.catalog_url.as_str())?);
        Self::with_resolver(config, &resolver, &engine)
    }

    /// Resolve the configured voice with an existing resolver and load it.
    pub fn with_resolver<E>(
        config: &SynthesizerConfig,
        resolver: &VoiceResolver,
        engine: &E,
    ) -> Result<Self>
    where
        E: SynthesisEngine<Voice = V>,
    {
        let resolved = resolver.resolve(&config.voice_request())?;
        log::info!("Loaded voice model {}", resolved.model.display());

        let session = SynthesisSession::load(engine, resolved, config.use_accelerator)?;
        Ok(Self {
            session,
            sink: AudioSink::new(),
        })
    }

    /// Synthesize `text` and write it to `target`.
    ///
    /// Returns the written file, or `None` for stdout.
    pub fn synthesize_speech(
        &mut self,
        text: &str,
        target: &OutputTarget,
        params: &SynthesisParameters,
    ) -> Result<Option<PathBuf>> {
        let synthesis = self.session.synthesize(text, params)?;
        let format = synthesis.format();
        self.sink.write(format, synthesis, target)
    }

    pub fn session(&self) -> &SynthesisSession<V> {
        &self.session
    }
}
