//! Piper (VITS) text-to-speech engine implementation.
//!
//! Piper voices are ONNX models paired with a JSON config describing the
//! sample rate, speakers, espeak-ng voice and phoneme-to-id map. Text is
//! phonemized sentence by sentence with espeak-ng and each sentence is run
//! through the model separately, so audio is produced incrementally.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Voice Layout
//!
//! ```text
//! voices/
//! ├── en_US-lessac-medium.onnx        # model weights
//! └── en_US-lessac-medium.onnx.json   # voice config
//! ```
//!
//! Voices are published at <https://huggingface.co/rhasspy/piper-voices> and
//! are downloaded on demand by [`VoiceResolver`](crate::VoiceResolver).
//!
//! The config and phonemizer are always available; the ONNX engine itself
//! requires the `piper` feature.

pub mod config;
pub mod error;
pub mod phonemizer;

#[cfg(feature = "piper")]
pub mod engine;
#[cfg(feature = "piper")]
pub mod model;

pub use config::PiperConfig;
#[cfg(feature = "piper")]
pub use engine::{PiperEngine, PiperVoice};
pub use error::PiperEngineError;
