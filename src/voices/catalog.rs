use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{PiperError, Result};

/// Extensions of the files that make up a loadable voice.
const MODEL_EXTENSION: &str = ".onnx";
const CONFIG_EXTENSION: &str = ".onnx.json";

/// One voice in the catalog (`voices.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Canonical key, e.g. `en_US-lessac-medium`
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: Option<CatalogLanguage>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub num_speakers: Option<u32>,
    /// Alternative names, in declaration order
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Files keyed by their path relative to the catalog root
    #[serde(default)]
    pub files: BTreeMap<String, CatalogFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogLanguage {
    pub code: String,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub md5_digest: Option<String>,
}

/// A file a voice needs locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFile {
    /// Path relative to the catalog root, used to download the file
    pub remote_path: String,
    /// Base name the file is stored under
    pub file_name: String,
    pub size_bytes: Option<u64>,
}

impl CatalogEntry {
    /// The model and config files of this voice; other files (model cards etc.) are skipped.
    pub fn voice_files(&self) -> Vec<VoiceFile> {
        self.files
            .iter()
            .filter(|(path, _)| path.ends_with(MODEL_EXTENSION) || path.ends_with(CONFIG_EXTENSION))
            .map(|(path, info)| VoiceFile {
                remote_path: path.clone(),
                file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
                size_bytes: info.size_bytes,
            })
            .collect()
    }

    /// Base names of the model and config file.
    ///
    /// Fails unless the catalog lists exactly one of each.
    pub fn model_and_config_names(&self) -> Result<(String, String)> {
        let files = self.voice_files();
        let pick = |suffix: &str| {
            let matching: Vec<&VoiceFile> = files
                .iter()
                .filter(|f| f.file_name.ends_with(suffix))
                .collect();
            match matching.as_slice() {
                [one] => Ok(one.file_name.clone()),
                [] => Err(PiperError::inconsistent(
                    &self.key,
                    format!("catalog lists no {suffix} file"),
                )),
                _ => Err(PiperError::inconsistent(
                    &self.key,
                    format!("catalog lists several {suffix} files"),
                )),
            }
        };

        let model = pick(MODEL_EXTENSION)?;
        let config = pick(CONFIG_EXTENSION)?;
        Ok((model, config))
    }
}

/// Parsed `voices.json`: canonical key to entry.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl VoiceCatalog {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut entries: BTreeMap<String, CatalogEntry> = serde_json::from_slice(bytes)
            .map_err(|e| PiperError::Config(format!("Failed to parse voice catalog: {e}")))?;

        for (key, entry) in entries.iter_mut() {
            if entry.key.is_empty() {
                entry.key = key.clone();
            } else if entry.key != *key {
                log::warn!(
                    "Catalog entry '{key}' declares key '{}'; using '{key}'",
                    entry.key
                );
                entry.key = key.clone();
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }
}

/// What a name in the flattened index refers to.
#[derive(Debug, Clone)]
enum IndexSlot {
    Voice {
        entry: Arc<CatalogEntry>,
        is_alias: bool,
    },
    /// The name is claimed by more than one voice.
    Ambiguous(Vec<String>),
}

/// Flat lookup table over canonical keys and aliases.
///
/// Built once per catalog load and never mutated; a refreshed catalog
/// produces a new index.
#[derive(Debug, Clone, Default)]
pub struct VoiceIndex {
    names: HashMap<String, IndexSlot>,
    keys: Vec<String>,
}

impl VoiceIndex {
    pub fn build(catalog: VoiceCatalog) -> Self {
        let mut names = HashMap::new();
        let mut keys = Vec::with_capacity(catalog.len());
        let entries: Vec<Arc<CatalogEntry>> =
            catalog.entries.into_values().map(Arc::new).collect();

        for entry in &entries {
            keys.push(entry.key.clone());
            names.insert(
                entry.key.clone(),
                IndexSlot::Voice {
                    entry: Arc::clone(entry),
                    is_alias: false,
                },
            );
        }

        for entry in &entries {
            for alias in &entry.aliases {
                let replacement = match names.get(alias) {
                    None => Some(IndexSlot::Voice {
                        entry: Arc::clone(entry),
                        is_alias: true,
                    }),
                    Some(IndexSlot::Voice { entry: existing, .. }) if existing.key == entry.key => {
                        None
                    }
                    Some(IndexSlot::Voice { entry: existing, .. }) => {
                        log::warn!(
                            "Voice name '{alias}' is claimed by '{}' and '{}'",
                            existing.key,
                            entry.key
                        );
                        let mut candidates = vec![existing.key.clone(), entry.key.clone()];
                        candidates.sort();
                        Some(IndexSlot::Ambiguous(candidates))
                    }
                    Some(IndexSlot::Ambiguous(candidates)) if candidates.contains(&entry.key) => {
                        None
                    }
                    Some(IndexSlot::Ambiguous(candidates)) => {
                        let mut candidates = candidates.clone();
                        candidates.push(entry.key.clone());
                        candidates.sort();
                        Some(IndexSlot::Ambiguous(candidates))
                    }
                };
                if let Some(slot) = replacement {
                    names.insert(alias.clone(), slot);
                }
            }
        }

        keys.sort();
        Self { names, keys }
    }

    /// Look up a canonical key or alias.
    ///
    /// Returns the entry and whether `name` was an alias.
    pub fn lookup(&self, name: &str) -> Result<(Arc<CatalogEntry>, bool)> {
        match self.names.get(name) {
            Some(IndexSlot::Voice { entry, is_alias }) => Ok((Arc::clone(entry), *is_alias)),
            Some(IndexSlot::Ambiguous(candidates)) => Err(PiperError::AmbiguousVoice {
                name: name.to_string(),
                candidates: candidates.clone(),
            }),
            None => Err(PiperError::VoiceNotFound(name.to_string())),
        }
    }

    /// Sorted canonical keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{demo_catalog_json, DEMO_KEY};

    fn index(json: &str) -> VoiceIndex {
        VoiceIndex::build(VoiceCatalog::parse(json.as_bytes()).unwrap())
    }

    #[test]
    fn parses_piper_catalog_files() {
        let catalog = VoiceCatalog::parse(demo_catalog_json().as_bytes()).unwrap();
        let entry = catalog.get(DEMO_KEY).unwrap();

        assert_eq!(entry.language.as_ref().unwrap().code, "en_US");
        let files = entry.voice_files();
        assert_eq!(files.len(), 2, "model card must be skipped");
        assert_eq!(
            entry.model_and_config_names().unwrap(),
            (
                format!("{DEMO_KEY}.onnx"),
                format!("{DEMO_KEY}.onnx.json")
            )
        );
    }

    #[test]
    fn alias_maps_to_canonical_entry() {
        let index = index(&demo_catalog_json());

        let (by_key, key_is_alias) = index.lookup(DEMO_KEY).unwrap();
        let (by_alias, alias_is_alias) = index.lookup("demo").unwrap();

        assert!(!key_is_alias);
        assert!(alias_is_alias);
        assert_eq!(by_key.key, by_alias.key);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let err = index(&demo_catalog_json()).lookup("xx_XX-nobody-low").unwrap_err();
        assert!(matches!(err, PiperError::VoiceNotFound(name) if name == "xx_XX-nobody-low"));
    }

    #[test]
    fn alias_colliding_with_key_is_ambiguous() {
        let json = r#"{
            "a-voice": {"aliases": [], "files": {}},
            "b-voice": {"aliases": ["a-voice", "bee"], "files": {}}
        }"#;
        let index = index(json);

        let err = index.lookup("a-voice").unwrap_err();
        match err {
            PiperError::AmbiguousVoice { name, candidates } => {
                assert_eq!(name, "a-voice");
                assert_eq!(candidates, vec!["a-voice".to_string(), "b-voice".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(index.lookup("bee").unwrap().0.key, "b-voice");
        assert_eq!(index.lookup("b-voice").unwrap().0.key, "b-voice");
    }

    #[test]
    fn alias_shared_by_two_voices_is_ambiguous() {
        let json = r#"{
            "one": {"aliases": ["shared"], "files": {}},
            "two": {"aliases": ["shared"], "files": {}}
        }"#;
        assert!(matches!(
            index(json).lookup("shared"),
            Err(PiperError::AmbiguousVoice { .. })
        ));
    }

    #[test]
    fn alias_repeating_own_key_is_harmless() {
        let json = r#"{"solo": {"aliases": ["solo", "solo"], "files": {}}}"#;
        let (entry, is_alias) = index(json).lookup("solo").unwrap();
        assert_eq!(entry.key, "solo");
        assert!(!is_alias);
    }

    #[test]
    fn entry_without_config_is_inconsistent() {
        let json = r#"{"half": {"files": {"x/half.onnx": {"size_bytes": 3}}}}"#;
        let catalog = VoiceCatalog::parse(json.as_bytes()).unwrap();
        assert!(matches!(
            catalog.get("half").unwrap().model_and_config_names(),
            Err(PiperError::InconsistentVoiceFiles { .. })
        ));
    }

    #[test]
    fn malformed_catalog_is_config_error() {
        assert!(matches!(
            VoiceCatalog::parse(b"[1, 2]"),
            Err(PiperError::Config(_))
        ));
    }
}
