//! Fakes shared by the unit tests.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::engines::piper::config::PiperConfig;
use crate::error::{BoxError, Result};
use crate::voices::CatalogSource;
use crate::{AudioFormat, LoadedVoice, ResolvedVoice, SentenceAudio, SynthesisEngine, SynthesisParameters};

pub const DEMO_KEY: &str = "en_US-demo-medium";

/// Voice config of the demo voice.
pub fn demo_config_json(sample_rate: u32, num_speakers: u32) -> String {
    format!(
        r#"{{
            "audio": {{"sample_rate": {sample_rate}, "quality": "medium"}},
            "espeak": {{"voice": "en-us"}},
            "inference": {{"noise_scale": 0.667, "length_scale": 1, "noise_w": 0.8}},
            "num_speakers": {num_speakers},
            "phoneme_id_map": {{"^": [1], "$": [2], "_": [0], "h": [20], "ə": [59]}}
        }}"#
    )
}

/// Remote files of the fake catalog, keyed by path relative to the catalog root.
fn demo_files() -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    files.insert(
        format!("en/en_US/demo/medium/{DEMO_KEY}.onnx"),
        b"not really an onnx model".to_vec(),
    );
    files.insert(
        format!("en/en_US/demo/medium/{DEMO_KEY}.onnx.json"),
        demo_config_json(22050, 1).into_bytes(),
    );
    files.insert(
        "en/en_US/demo/medium/MODEL_CARD".to_string(),
        b"demo voice".to_vec(),
    );
    files.insert(
        "de/de_DE/other/low/de_DE-other-low.onnx".to_string(),
        b"other".to_vec(),
    );
    files.insert(
        "de/de_DE/other/low/de_DE-other-low.onnx.json".to_string(),
        demo_config_json(16000, 1).into_bytes(),
    );
    files
}

/// A `voices.json` describing [`demo_files`], with alias `demo` for [`DEMO_KEY`].
pub fn demo_catalog_json() -> String {
    let files = demo_files();
    let manifest = |prefix: &str| {
        let entries: serde_json::Map<String, serde_json::Value> = files
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, bytes)| {
                (
                    path.clone(),
                    serde_json::json!({"size_bytes": bytes.len(), "md5_digest": ""}),
                )
            })
            .collect();
        serde_json::Value::Object(entries)
    };

    serde_json::json!({
        DEMO_KEY: {
            "key": DEMO_KEY,
            "name": "demo",
            "language": {"code": "en_US", "family": "en"},
            "quality": "medium",
            "num_speakers": 1,
            "aliases": ["demo"],
            "files": manifest("en/"),
        },
        "de_DE-other-low": {
            "key": "de_DE-other-low",
            "name": "other",
            "language": {"code": "de_DE", "family": "de"},
            "quality": "low",
            "num_speakers": 1,
            "aliases": [],
            "files": manifest("de/"),
        }
    })
    .to_string()
}

/// In-memory catalog source that counts what it serves.
#[derive(Clone)]
pub struct FakeCatalog {
    catalog: String,
    files: Arc<BTreeMap<String, Vec<u8>>>,
    catalog_fetches: Arc<AtomicUsize>,
    file_fetches: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeCatalog {
    pub fn new(catalog: String) -> Self {
        Self {
            catalog,
            files: Arc::new(demo_files()),
            catalog_fetches: Arc::default(),
            file_fetches: Arc::default(),
            offline: Arc::default(),
            failing: Arc::default(),
        }
    }

    pub fn catalog_fetches(&self) -> usize {
        self.catalog_fetches.load(Ordering::SeqCst)
    }

    pub fn file_fetches(&self) -> usize {
        self.file_fetches.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make downloads of files with this base name fail halfway.
    pub fn fail_file(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "catalog offline").into());
        }
        Ok(())
    }
}

impl CatalogSource for FakeCatalog {
    fn fetch_catalog(&self) -> Result<Vec<u8>> {
        self.check_online()?;
        self.catalog_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.catalog.clone().into_bytes())
    }

    fn fetch_file(&self, remote_path: &str, dest: &mut dyn Write) -> Result<u64> {
        self.check_online()?;
        self.file_fetches.fetch_add(1, Ordering::SeqCst);

        let bytes = self
            .files
            .get(remote_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, remote_path.to_string()))?;

        let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        if self.failing.lock().unwrap().contains(file_name) {
            dest.write_all(&bytes[..bytes.len() / 2])?;
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset").into());
        }

        dest.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// `blocks` blocks of `len` samples of a 440 Hz tone.
pub fn sine_blocks(blocks: usize, len: usize) -> Vec<Result<Vec<i16>>> {
    (0..blocks)
        .map(|b| {
            Ok((0..len)
                .map(|i| {
                    let t = (b * len + i) as f32 / 22050.0;
                    ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16
                })
                .collect())
        })
        .collect()
}

/// Engine that reads a real voice config but produces a synthetic tone.
///
/// Each sentence (split on `.`) yields 100 samples per character.
#[derive(Default)]
pub struct FakeEngine {
    /// Fail synthesis after this many sentences
    pub fail_after: Option<usize>,
}

pub struct FakeVoice {
    format: AudioFormat,
    num_speakers: u32,
    fail_after: Option<usize>,
    pub last_params: Option<SynthesisParameters>,
}

impl SynthesisEngine for FakeEngine {
    type Voice = FakeVoice;

    fn load_voice(&self, voice: &ResolvedVoice, _use_accelerator: bool) -> Result<FakeVoice, BoxError> {
        let config = PiperConfig::load(&voice.config)?;
        Ok(FakeVoice {
            format: config.audio_format(),
            num_speakers: config.num_speakers,
            fail_after: self.fail_after,
            last_params: None,
        })
    }
}

impl LoadedVoice for FakeVoice {
    fn audio_format(&self) -> AudioFormat {
        self.format
    }

    fn num_speakers(&self) -> u32 {
        self.num_speakers
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParameters,
    ) -> Result<SentenceAudio<'_>, BoxError> {
        self.last_params = Some(params.clone());
        let channels = usize::from(self.format.channels);
        let fail_after = self.fail_after;

        let sentences: Vec<usize> = text
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().count() * 100 * channels)
            .collect();

        Ok(Box::new(sentences.into_iter().enumerate().map(
            move |(i, len)| match fail_after {
                Some(limit) if i >= limit => Err(BoxError::from("fake engine failure")),
                _ => Ok(vec![1000i16; len]),
            },
        )))
    }
}

