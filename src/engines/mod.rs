//! Speech synthesis engines.
//!
//! This module contains implementations of [`SynthesisEngine`](crate::SynthesisEngine).
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `piper` - Piper VITS voices (ONNX format, espeak-ng required)

pub mod piper;
