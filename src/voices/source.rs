use std::io::{self, Write};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::Result;

/// Root of the published Piper voices.
pub const DEFAULT_CATALOG_URL: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0";

/// Name of the catalog file, both remotely and in the download directory.
pub const CATALOG_FILE_NAME: &str = "voices.json";

/// Remote side of the voice catalog.
///
/// Implementations only move bytes; caching and validation happen in
/// [`VoiceResolver`](super::VoiceResolver).
pub trait CatalogSource: Send + Sync {
    /// Fetch the raw `voices.json` document.
    fn fetch_catalog(&self) -> Result<Vec<u8>>;

    /// Stream the file at `remote_path` (relative to the catalog root) into `dest`.
    ///
    /// Returns the number of bytes written.
    fn fetch_file(&self, remote_path: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Catalog served over HTTP(S), laid out like the Piper voices repository.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("piper-synth/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.base_url, remote_path.trim_start_matches('/'))
    }
}

impl CatalogSource for HttpCatalog {
    fn fetch_catalog(&self) -> Result<Vec<u8>> {
        let url = self.url(CATALOG_FILE_NAME);
        log::debug!("Downloading voice catalog from {url}");

        let response = self.client.get(&url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }

    fn fetch_file(&self, remote_path: &str, dest: &mut dyn Write) -> Result<u64> {
        let url = self.url(remote_path);
        log::debug!("Downloading {url}");

        let mut response = self.client.get(&url).send()?.error_for_status()?;
        Ok(io::copy(&mut response, dest)?)
    }
}
