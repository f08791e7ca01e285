use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::error::PiperEngineError;
use crate::AudioFormat;

/// Contents of a Piper voice's `.onnx.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PiperConfig {
    pub audio: AudioConfig,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
    #[serde(default)]
    pub speaker_id_map: HashMap<String, i64>,
    #[serde(default)]
    pub espeak: EspeakVoice,
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Phoneme (a single code point) to model input ids
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakVoice {
    pub voice: String,
}

impl Default for EspeakVoice {
    fn default() -> Self {
        Self {
            voice: "en-us".to_string(),
        }
    }
}

/// Default scales used when a request leaves them unset.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

fn default_num_speakers() -> u32 {
    1
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl PiperConfig {
    pub fn load(path: &Path) -> Result<Self, PiperEngineError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PiperEngineError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono(self.audio.sample_rate)
    }

    /// Ids for one phoneme, if the voice knows it.
    pub fn ids_for(&self, phoneme: char) -> Option<&[i64]> {
        let mut buf = [0u8; 4];
        self.phoneme_id_map
            .get(&*phoneme.encode_utf8(&mut buf))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::demo_config_json;

    #[test]
    fn parses_voice_config() {
        let config: PiperConfig = serde_json::from_str(&demo_config_json(22050, 4)).unwrap();
        assert_eq!(config.audio_format(), AudioFormat::mono(22050));
        assert_eq!(config.num_speakers, 4);
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.ids_for('ə'), Some(&[59][..]));
        assert_eq!(config.ids_for('z'), None);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: PiperConfig =
            serde_json::from_str(r#"{"audio": {"sample_rate": 16000}}"#).unwrap();
        assert_eq!(config.num_speakers, 1);
        assert_eq!(config.inference.noise_scale, 0.667);
        assert_eq!(config.inference.length_scale, 1.0);
        assert_eq!(config.inference.noise_w, 0.8);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PiperConfig::load(Path::new("/nonexistent/voice.onnx.json")).unwrap_err();
        assert!(matches!(err, PiperEngineError::Io(_)));
    }
}
