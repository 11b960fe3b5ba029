//! Hub registry access and the local model cache
//!
//! Pretrained backbones live in hub repositories holding a `config.json`
//! and an exported `onnx/model.onnx`. [`ModelCache`] manages the
//! XDG-compliant on-disk layout; [`HubClient`] fetches files into it with
//! async streaming downloads, honoring the caller's [`LoadOptions`]
//! (cache override, forced re-download, offline mode, revision, token).

use crate::backends::MODEL_WEIGHTS_FILE;
use crate::config::LoadOptions;
use crate::error::{HubVisionError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Base URL of the model hub
const HUB_BASE_URL: &str = "https://huggingface.co";

/// Name of the config file inside a model repository
pub const CONFIG_FILE: &str = "config.json";

/// Information about one cached model directory
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Cache directory name of the model
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether the translated config file is present
    pub has_config: bool,
    /// Whether the exported weights are present
    pub has_weights: bool,
    /// Estimated size of the model directory in bytes
    pub size_bytes: u64,
}

/// Local model cache manager
///
/// Uses the XDG Base Directory specification for the cache location:
/// - Linux/macOS: `~/.cache/hubvision/models/`
/// - Windows: `%LOCALAPPDATA%/hubvision/models/`
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager at the default location
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::default_cache_dir()?)
    }

    /// Create a cache manager rooted at an explicit directory
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                HubVisionError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        // Environment variable override first
        if let Ok(cache_override) = std::env::var("HUBVISION_CACHE_DIR") {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                HubVisionError::invalid_config(
                    "Failed to determine cache directory. Set HUBVISION_CACHE_DIR environment variable."
                        .to_string(),
                )
            })?
            .join("hubvision")
            .join("models"))
    }

    /// Map a hub model ID to a filesystem-safe cache directory name
    ///
    /// IDs like `acme/vit-tiny` become `acme--vit-tiny`. IDs with characters
    /// unsafe for directory names fall back to a hash-based identifier.
    #[must_use]
    pub fn model_id_to_dir_name(model_id: &str) -> String {
        let safe = model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
        if safe && !model_id.is_empty() {
            model_id.replace('/', "--")
        } else {
            let mut hasher = Sha256::new();
            hasher.update(model_id.as_bytes());
            let hash = format!("{:x}", hasher.finalize());
            format!("id-{}", hash.get(..16).unwrap_or(&hash))
        }
    }

    /// Check whether a model has a cached config
    #[must_use]
    pub fn is_cached(&self, model_id: &str) -> bool {
        self.model_path(model_id).join(CONFIG_FILE).exists()
    }

    /// Path of the cache directory for a model (may not exist yet)
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(Self::model_id_to_dir_name(model_id))
    }

    /// Scan the cache directory and describe every model in it
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            HubVisionError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry
                .map_err(|e| HubVisionError::file_io_error("read cache entry", &self.cache_dir, &e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(model_id) = path.file_name().and_then(|name| name.to_str()) else {
                log::debug!("Skipping cache entry with non-UTF-8 name: {}", path.display());
                continue;
            };
            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                has_config: path.join(CONFIG_FILE).exists(),
                has_weights: path.join(MODEL_WEIGHTS_FILE).exists(),
                size_bytes: Self::directory_size(&path),
                path,
            });
        }

        // Sorted for stable listing output
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn directory_size(dir: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    Self::directory_size(&path)
                } else {
                    entry.metadata().map(|m| m.len()).unwrap_or(0)
                }
            })
            .sum()
    }
}

/// Progress reporting abstraction usable with and without the CLI feature
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Create a byte-level progress bar when the CLI feature is enabled
    #[must_use]
    pub fn new() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client for fetching model files from the hub
#[derive(Debug)]
pub struct HubClient {
    client: Client,
    cache: ModelCache,
}

impl HubClient {
    /// Create a hub client honoring the cache directory in `options`
    ///
    /// # Errors
    /// - Failed to create the HTTP client
    /// - Failed to initialize the model cache
    pub fn new(options: &LoadOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| HubVisionError::network_error("Failed to create HTTP client", e))?;

        let cache = match &options.cache_dir {
            Some(dir) => ModelCache::with_dir(dir.clone())?,
            None => ModelCache::new()?,
        };

        Ok(Self { client, cache })
    }

    /// The cache this client downloads into
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Load a model's raw config dict, downloading it if necessary
    ///
    /// Returns the parsed dict and the model's cache directory. A cached
    /// config is reused unless `force_download` is set; `local_files_only`
    /// turns a cache miss into an error instead of a download.
    ///
    /// # Errors
    /// - Cache miss in offline mode
    /// - Network or HTTP failures
    /// - Config file not valid JSON or not a JSON object
    pub async fn load_config(
        &self,
        model_id: &str,
        options: &LoadOptions,
    ) -> Result<(Map<String, Value>, PathBuf)> {
        let model_dir = self.cache.model_path(model_id);
        let config_path = model_dir.join(CONFIG_FILE);

        if !config_path.exists() || options.force_download {
            if options.local_files_only {
                return Err(HubVisionError::invalid_config(format!(
                    "Config for '{model_id}' is not cached and local_files_only is set"
                )));
            }
            log::info!("Fetching config for '{model_id}' (revision {})", options.revision);
            self.fetch_file(model_id, CONFIG_FILE, &config_path, options, None)
                .await?;
        }

        let contents = fs::read_to_string(&config_path)
            .map_err(|e| HubVisionError::file_io_error("read config file", &config_path, &e))?;
        let value: Value = serde_json::from_str(&contents)?;
        let Value::Object(dict) = value else {
            return Err(HubVisionError::invalid_config(format!(
                "Config for '{model_id}' is not a JSON object"
            )));
        };
        Ok((dict, model_dir))
    }

    /// Make sure the exported weights are cached, downloading on demand
    ///
    /// Returns the path of the weight file.
    ///
    /// # Errors
    /// - Cache miss in offline mode
    /// - Network or HTTP failures
    pub async fn ensure_model_file(&self, model_id: &str, options: &LoadOptions) -> Result<PathBuf> {
        self.ensure_model_file_with_progress(model_id, options, None)
            .await
    }

    /// [`HubClient::ensure_model_file`] with download progress reporting
    ///
    /// # Errors
    /// Same as [`HubClient::ensure_model_file`].
    pub async fn ensure_model_file_with_progress(
        &self,
        model_id: &str,
        options: &LoadOptions,
        progress: Option<&ProgressIndicator>,
    ) -> Result<PathBuf> {
        let weights_path = self.cache.model_path(model_id).join(MODEL_WEIGHTS_FILE);

        if weights_path.exists() && !options.force_download {
            log::debug!("Using cached weights: {}", weights_path.display());
            return Ok(weights_path);
        }
        if options.local_files_only {
            return Err(HubVisionError::invalid_config(format!(
                "Weights for '{model_id}' are not cached and local_files_only is set"
            )));
        }

        log::info!("Fetching weights for '{model_id}' (revision {})", options.revision);
        self.fetch_file(model_id, MODEL_WEIGHTS_FILE, &weights_path, options, progress)
            .await?;
        Ok(weights_path)
    }

    fn resolve_url(model_id: &str, file_name: &str, revision: &str) -> String {
        format!("{HUB_BASE_URL}/{model_id}/resolve/{revision}/{file_name}")
    }

    /// Download one repository file to its final cache location
    ///
    /// The download streams into a sibling `.partial` file which is renamed
    /// into place on success, so a cached file is never left truncated.
    async fn fetch_file(
        &self,
        model_id: &str,
        file_name: &str,
        final_path: &Path,
        options: &LoadOptions,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let url = Self::resolve_url(model_id, file_name, &options.revision);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HubVisionError::file_io_error("create cache directory", parent, &e))?;
        }
        let partial_path = final_path.with_extension("partial");

        let download = self
            .download_to(&url, &partial_path, options, progress)
            .await;
        if let Err(e) = download {
            if partial_path.exists() {
                if let Err(cleanup_err) = fs::remove_file(&partial_path) {
                    log::warn!("Failed to clean up partial download: {cleanup_err}");
                }
            }
            return Err(e);
        }

        fs::rename(&partial_path, final_path)
            .map_err(|e| HubVisionError::file_io_error("move download into cache", final_path, &e))
    }

    async fn download_to(
        &self,
        url: &str,
        local_path: &Path,
        options: &LoadOptions,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let mut request = self.client.get(url);
        if let Some(token) = &options.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HubVisionError::network_error(&format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(HubVisionError::Network(format!(
                "HTTP error {} for {url}",
                response.status()
            )));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| HubVisionError::file_io_error("create download file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| HubVisionError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| HubVisionError::file_io_error("write download file", local_path, &e))?;

            downloaded += bytes_read as u64;
            if let Some(pb) = progress {
                if total_size.is_some() {
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!("Downloaded {:.1} MB", downloaded as f64 / 1_024_000.0));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| HubVisionError::file_io_error("flush download file", local_path, &e))?;
        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok(())
    }
}
