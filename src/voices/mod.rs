//! Voice resolution: turning a user-supplied identifier into local voice files.
//!
//! An identifier may be:
//! - a path to an existing `.onnx` model, used as-is
//! - a canonical catalog key such as `en_US-lessac-medium`
//! - an alias declared by a catalog entry
//!
//! Catalog voices are downloaded into the download directory on first use
//! and found there (or in any search directory) afterwards.

pub mod catalog;
pub mod resolver;
pub mod source;

use std::path::PathBuf;

use derive_builder::Builder;

pub use catalog::{CatalogEntry, CatalogFile, VoiceCatalog, VoiceIndex};
pub use resolver::VoiceResolver;
pub use source::{CatalogSource, HttpCatalog, DEFAULT_CATALOG_URL};

/// Local model and config files for one voice.
///
/// Both files existed when the value was produced, and belong to the same voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVoice {
    /// Path to the `.onnx` model
    pub model: PathBuf,
    /// Path to the model's `.onnx.json` config
    pub config: PathBuf,
}

/// Inputs to a single voice resolution.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct VoiceRequest {
    /// Model path, catalog key or alias.
    pub identifier: String,
    /// Config to pair with a model given by path.
    #[builder(default, setter(into, strip_option))]
    pub config: Option<PathBuf>,
    /// Directories searched for already-downloaded voices.
    #[builder(default)]
    pub search_dirs: Vec<PathBuf>,
    /// Where missing voices and the cached catalog are written.
    #[builder(default, setter(into, strip_option))]
    pub download_dir: Option<PathBuf>,
    /// Re-fetch the catalog even when a cached copy exists.
    #[builder(default)]
    pub refresh_catalog: bool,
}

impl VoiceRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            config: None,
            search_dirs: Vec::new(),
            download_dir: None,
            refresh_catalog: false,
        }
    }

    /// Search directories, falling back to the current directory.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        if self.search_dirs.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.search_dirs.clone()
        }
    }

    /// Download directory, falling back to the first search directory.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(|| self.search_dirs.first().cloned())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Every directory a voice may live in: search dirs, then the download dir.
    pub(crate) fn lookup_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_dirs();
        let download_dir = self.download_dir();
        if !dirs.contains(&download_dir) {
            dirs.push(download_dir);
        }
        dirs
    }
}
