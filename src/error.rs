use std::path::PathBuf;

/// Boxed error returned by engine collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = PiperError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error("Voice '{0}' is not a local file and is not in the voice catalog")]
    VoiceNotFound(String),
    #[error("Voice name '{name}' is ambiguous: it refers to {candidates:?}")]
    AmbiguousVoice {
        name: String,
        candidates: Vec<String>,
    },
    #[error("Voice catalog unavailable: {source}")]
    CatalogUnavailable {
        #[source]
        source: Box<PiperError>,
    },
    #[error("Inconsistent voice files for '{voice}': {reason}")]
    InconsistentVoiceFiles { voice: String, reason: String },
    #[error("Failed to download '{file}': {source}")]
    Download {
        file: String,
        #[source]
        source: Box<PiperError>,
    },
    #[error("Failed to load voice: {0}")]
    EngineLoad(#[source] BoxError),
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] BoxError),
    #[error("Invalid synthesis parameter: {0}")]
    InvalidParameter(String),
    #[error("Failed writing audio to {}: {source}", path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: Box<PiperError>,
    },
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PiperError {
    pub(crate) fn catalog_unavailable(source: PiperError) -> Self {
        Self::CatalogUnavailable {
            source: Box::new(source),
        }
    }

    pub(crate) fn inconsistent(voice: &str, reason: impl Into<String>) -> Self {
        Self::InconsistentVoiceFiles {
            voice: voice.to_string(),
            reason: reason.into(),
        }
    }
}
