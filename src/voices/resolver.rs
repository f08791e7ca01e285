use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::catalog::{CatalogEntry, VoiceCatalog, VoiceFile, VoiceIndex};
use super::source::{CatalogSource, HttpCatalog, CATALOG_FILE_NAME, DEFAULT_CATALOG_URL};
use super::{ResolvedVoice, VoiceRequest};
use crate::error::{PiperError, Result};

/// Resolves voice identifiers to local files, downloading catalog voices on demand.
///
/// A resolver can be shared between threads. One parsed catalog is kept per
/// download directory, held behind an `Arc` and swapped whole on refresh.
/// Downloads of the same voice into the same directory are serialized.
pub struct VoiceResolver {
    source: Box<dyn CatalogSource>,
    indexes: RwLock<HashMap<PathBuf, Arc<VoiceIndex>>>,
    catalog_lock: Mutex<()>,
    fetch_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl VoiceResolver {
    pub fn new(source: impl CatalogSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            indexes: RwLock::new(HashMap::new()),
            catalog_lock: Mutex::new(()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver backed by the public Piper voices repository.
    pub fn with_default_catalog() -> Result<Self> {
        Ok(Self::new(HttpCatalog::new(DEFAULT_CATALOG_URL)?))
    }

    /// Resolve `request.identifier` to a local (model, config) pair.
    pub fn resolve(&self, request: &VoiceRequest) -> Result<ResolvedVoice> {
        let identifier = request.identifier.as_str();

        let model_path = Path::new(identifier);
        if model_path.is_file() {
            log::debug!("Using local model file {}", model_path.display());
            return resolve_model_file(model_path, request.config.as_deref());
        }

        let download_dir = request.download_dir();
        let lookup_dirs = request.lookup_dirs();

        let index = match self.catalog(&download_dir, request.refresh_catalog) {
            Ok(index) => index,
            Err(err) => {
                let model_name = format!("{identifier}.onnx");
                let config_name = format!("{identifier}.onnx.json");
                return match find_voice(identifier, &model_name, &config_name, &lookup_dirs)? {
                    Some(voice) => {
                        log::warn!("{err}; using local copy of '{identifier}'");
                        Ok(voice)
                    }
                    None => Err(err),
                };
            }
        };

        let (entry, is_alias) = index.lookup(identifier)?;
        if is_alias {
            log::debug!("'{identifier}' is an alias of '{}'", entry.key);
        }

        let (model_name, config_name) = entry.model_and_config_names()?;
        let dir = self.ensure_voice_exists(&entry, &lookup_dirs, &download_dir)?;

        Ok(ResolvedVoice {
            model: dir.join(model_name),
            config: dir.join(config_name),
        })
    }

    /// Sorted canonical keys of the catalog.
    pub fn list_voices(&self, download_dir: &Path, refresh: bool) -> Result<Vec<String>> {
        Ok(self.catalog(download_dir, refresh)?.keys().to_vec())
    }

    /// Catalog index for `download_dir`, loading it on first use or when `refresh` is set.
    fn catalog(&self, download_dir: &Path, refresh: bool) -> Result<Arc<VoiceIndex>> {
        if !refresh {
            if let Some(index) = self.current_index(download_dir) {
                return Ok(index);
            }
        }

        let _loading = self.catalog_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !refresh {
            // another caller may have finished loading while we waited
            if let Some(index) = self.current_index(download_dir) {
                return Ok(index);
            }
        }

        let catalog = self.load_catalog(download_dir, refresh)?;
        log::debug!(
            "Loaded catalog with {} voices for {}",
            catalog.len(),
            download_dir.display()
        );
        let index = Arc::new(VoiceIndex::build(catalog));

        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        indexes.insert(download_dir.to_path_buf(), Arc::clone(&index));
        Ok(index)
    }

    fn current_index(&self, download_dir: &Path) -> Option<Arc<VoiceIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(download_dir)
            .map(Arc::clone)
    }

    /// Read the cached `voices.json`, fetching it when absent or when asked to refresh.
    fn load_catalog(&self, download_dir: &Path, refresh: bool) -> Result<VoiceCatalog> {
        let cached = download_dir.join(CATALOG_FILE_NAME);

        if refresh || !cached.is_file() {
            match self.fetch_catalog(&cached) {
                Ok(catalog) => return Ok(catalog),
                Err(err) if cached.is_file() => {
                    log::warn!("{err}; using cached {}", cached.display());
                }
                Err(err) => return Err(err),
            }
        }

        let bytes = fs::read(&cached).map_err(|e| PiperError::catalog_unavailable(e.into()))?;
        VoiceCatalog::parse(&bytes).map_err(PiperError::catalog_unavailable)
    }

    fn fetch_catalog(&self, cached: &Path) -> Result<VoiceCatalog> {
        let bytes = self
            .source
            .fetch_catalog()
            .map_err(PiperError::catalog_unavailable)?;
        let catalog = VoiceCatalog::parse(&bytes).map_err(PiperError::catalog_unavailable)?;

        if let Err(e) = write_atomically(cached, |file| Ok(file.write_all(&bytes)?)) {
            log::warn!("Could not cache voice catalog at {}: {e}", cached.display());
        }
        Ok(catalog)
    }

    /// Find a lookup directory holding every file of `entry` with the catalog's
    /// sizes, downloading into `download_dir` when none does.
    ///
    /// Returns the directory the voice should be loaded from.
    fn ensure_voice_exists(
        &self,
        entry: &CatalogEntry,
        lookup_dirs: &[PathBuf],
        download_dir: &Path,
    ) -> Result<PathBuf> {
        let files = entry.voice_files();
        if files.is_empty() {
            return Err(PiperError::inconsistent(&entry.key, "catalog lists no voice files"));
        }

        let lock = self.fetch_lock(&download_dir.join(&entry.key));
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(dir) = lookup_dirs
            .iter()
            .find(|dir| missing_files(dir, &files).is_empty())
        {
            log::debug!("Voice '{}' found in {}", entry.key, dir.display());
            return Ok(dir.clone());
        }

        fs::create_dir_all(download_dir)?;
        for file in missing_files(download_dir, &files) {
            log::info!("Downloading {} to {}", file.remote_path, download_dir.display());
            self.download_file(file, download_dir)?;
        }

        if !missing_files(download_dir, &files).is_empty() {
            return Err(PiperError::inconsistent(
                &entry.key,
                "voice files missing after download",
            ));
        }
        Ok(download_dir.to_path_buf())
    }

    fn download_file(&self, file: &VoiceFile, download_dir: &Path) -> Result<()> {
        let dest = download_dir.join(&file.file_name);
        let download_error = |source: PiperError| PiperError::Download {
            file: file.remote_path.clone(),
            source: Box::new(source),
        };

        write_atomically(&dest, |out| {
            let written = self.source.fetch_file(&file.remote_path, out)?;
            match file.size_bytes {
                Some(expected) if expected != written => Err(PiperError::inconsistent(
                    &file.file_name,
                    format!("expected {expected} bytes, received {written}"),
                )),
                _ => Ok(()),
            }
        })
        .map_err(download_error)
    }

    fn fetch_lock(&self, target: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(target.to_path_buf()).or_default())
    }
}

/// Pair a model given by path with its config.
///
/// Without an explicit config, the engine's conventional `<model>.json` is used.
fn resolve_model_file(model: &Path, config: Option<&Path>) -> Result<ResolvedVoice> {
    let config = match config {
        Some(config) => config.to_path_buf(),
        None => {
            let mut name = model.as_os_str().to_os_string();
            name.push(".json");
            PathBuf::from(name)
        }
    };

    if !config.is_file() {
        return Err(PiperError::inconsistent(
            &model.display().to_string(),
            format!("config {} does not exist", config.display()),
        ));
    }

    Ok(ResolvedVoice {
        model: model.to_path_buf(),
        config,
    })
}

/// Find a directory holding both `model_name` and `config_name`.
///
/// A directory holding only one of them is reported as inconsistent unless a
/// later directory holds the complete pair.
fn find_voice(
    voice: &str,
    model_name: &str,
    config_name: &str,
    dirs: &[PathBuf],
) -> Result<Option<ResolvedVoice>> {
    let mut half_present = None;

    for dir in dirs {
        let model = dir.join(model_name);
        let config = dir.join(config_name);
        let reason = match (model.is_file(), config.is_file()) {
            (true, true) => return Ok(Some(ResolvedVoice { model, config })),
            (true, false) => format!("{} has no config", model.display()),
            (false, true) => format!("{} has no model", config.display()),
            (false, false) => continue,
        };
        half_present.get_or_insert(reason);
    }

    match half_present {
        Some(reason) => Err(PiperError::inconsistent(voice, reason)),
        None => Ok(None),
    }
}

fn missing_files<'a>(dir: &Path, files: &'a [VoiceFile]) -> Vec<&'a VoiceFile> {
    files
        .iter()
        .filter(|file| {
            let path = dir.join(&file.file_name);
            match (fs::metadata(&path), file.size_bytes) {
                (Err(_), _) => true,
                (Ok(meta), Some(expected)) if meta.len() != expected => {
                    log::debug!(
                        "{} has {} bytes, expected {expected}",
                        path.display(),
                        meta.len()
                    );
                    true
                }
                (Ok(_), _) => false,
            }
        })
        .collect()
}

/// Write `dest` through a temporary sibling that is renamed into place on success.
fn write_atomically<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".download.tmp");
    let temp_path = dest.with_file_name(name);

    let result = (|| -> Result<()> {
        let mut out = BufWriter::new(File::create(&temp_path)?);
        write(&mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);
        fs::rename(&temp_path, dest)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
