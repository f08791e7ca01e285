use std::path::Path;

use ndarray::Array2;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::error::PiperEngineError;

/// Largest magnitude of a normalized 16-bit sample.
const MAX_WAV_VALUE: f32 = 32767.0;

/// Noise, length and width scales in the order the model expects them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scales {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
}

/// A Piper VITS model loaded into an ONNX runtime session.
pub struct PiperModel {
    session: Session,
    /// True if the model takes a `sid` input
    multi_speaker: bool,
}

impl PiperModel {
    pub fn load(
        onnx_path: &Path,
        num_threads: Option<usize>,
        use_accelerator: bool,
    ) -> Result<Self, PiperEngineError> {
        log::info!("Loading Piper model from {}", onnx_path.display());

        let mut providers = Vec::new();
        if use_accelerator {
            providers.push(CUDAExecutionProvider::default().build());
        }
        providers.push(CPUExecutionProvider::default().build());

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?;

        if let Some(threads) = num_threads {
            builder = builder
                .with_intra_threads(threads)?
                .with_inter_threads(threads)?;
        }

        let session = builder.commit_from_file(onnx_path)?;
        let multi_speaker = session.inputs().iter().any(|input| input.name() == "sid");
        log::debug!("Model takes speaker id: {multi_speaker}");

        Ok(Self {
            session,
            multi_speaker,
        })
    }

    /// Run the model on one sentence of phoneme ids, returning float audio.
    pub fn infer(
        &mut self,
        ids: &[i64],
        speaker_id: i64,
        scales: Scales,
    ) -> Result<Vec<f32>, PiperEngineError> {
        let input = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
        let input_lengths = ndarray::arr1(&[ids.len() as i64]);
        let scales = ndarray::arr1(&[scales.noise_scale, scales.length_scale, scales.noise_w]);

        let output = if self.multi_speaker {
            let sid = ndarray::arr1(&[speaker_id]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
                "sid" => TensorRef::from_array_view(sid.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ];
            self.session.run(inputs)?
        };

        let first_output = output.iter().next().ok_or(PiperEngineError::NoOutput)?;
        let audio = first_output.1.try_extract_array::<f32>()?;

        Ok(audio.iter().copied().collect())
    }
}

/// Convert float audio to 16-bit PCM, normalizing to the loudest sample.
pub fn audio_float_to_int16(audio: &[f32]) -> Vec<i16> {
    let peak = audio.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    let scale = MAX_WAV_VALUE / peak.max(0.01);

    audio
        .iter()
        .map(|s| (s * scale).clamp(-MAX_WAV_VALUE, MAX_WAV_VALUE) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_full_scale() {
        let pcm = audio_float_to_int16(&[0.0, 0.5, -0.25]);
        assert_eq!(pcm, vec![0, 32767, -16383]);
    }

    #[test]
    fn quiet_audio_is_not_amplified_past_floor() {
        let pcm = audio_float_to_int16(&[0.001, -0.001]);
        assert_eq!(pcm, vec![3276, -3276]);
    }
}
