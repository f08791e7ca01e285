#[derive(thiserror::Error, Debug)]
pub enum PiperEngineError {
    #[error("ONNX runtime error: {0}")]
    Inference(#[source] crate::BoxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid voice config: {0}")]
    Config(String),
    #[error("Model produced no audio output")]
    NoOutput,
}

#[cfg(feature = "piper")]
impl From<ort::Error> for PiperEngineError {
    fn from(e: ort::Error) -> Self {
        Self::Inference(Box::new(e))
    }
}

#[cfg(feature = "piper")]
impl From<ndarray::ShapeError> for PiperEngineError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Inference(Box::new(e))
    }
}
