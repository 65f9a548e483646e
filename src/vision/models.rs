//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of PaddleOCR models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Environment variable that forbids network downloads
pub const OFFLINE_ENV: &str = "PDF_WORD_HIGHLIGHTER_OFFLINE";

/// Model identifier for PaddleOCR components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (CRNN)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelType {
    /// Everything the engine needs to start
    pub const REQUIRED: [ModelType; 3] =
        [ModelType::Detection, ModelType::Recognition, ModelType::Dictionary];

    /// Get the filename for this model type
    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Detection => "det.onnx",
            ModelType::Recognition => "rec.onnx",
            ModelType::Dictionary => "dict.txt",
        }
    }

    /// Get the download URL for this model
    pub fn download_url(&self) -> &'static str {
        match self {
            ModelType::Detection => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx"
            }
            ModelType::Recognition => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx"
            }
            ModelType::Dictionary => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt"
            }
        }
    }

    /// Expected file size for integrity check (approximate, in bytes)
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Detection => (2_000_000, 5_000_000),
            ModelType::Recognition => (7_000_000, 10_000_000),
            ModelType::Dictionary => (500, 10_000),
        }
    }

    /// Display name for progress reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detection => "Text Detection",
            ModelType::Recognition => "Text Recognition",
            ModelType::Dictionary => "Character Dictionary",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Seconds since the Unix epoch
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Model manager for downloading and caching ONNX models
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Create a model manager rooted in the per-user data directory
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self { models_dir })
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// Check if a model is already downloaded
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        match std::fs::metadata(self.model_path(model_type)) {
            Ok(metadata) => {
                let (min, max) = model_type.expected_size_range();
                (min..=max).contains(&metadata.len())
            }
            Err(_) => false,
        }
    }

    /// Make sure every model the engine needs is on disk, downloading the
    /// missing ones. Paths are returned in [`ModelType::REQUIRED`] order.
    pub fn ensure_required(&self) -> Result<[PathBuf; 3]> {
        for model_type in ModelType::REQUIRED {
            self.ensure_model(model_type)?;
        }
        Ok(ModelType::REQUIRED.map(|m| self.model_path(m)))
    }

    /// Download a model if not already available.
    /// Returns the path to the model file
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        self.download_model(model_type)?;
        Ok(path)
    }

    /// Download a specific model (blocking)
    fn download_model(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url();
        let path = self.model_path(model_type);

        if std::env::var_os(OFFLINE_ENV).is_some() {
            anyhow::bail!(
                "Offline mode: cannot download models. \
                 Please download manually from {} and place at {:?}",
                url,
                path
            );
        }

        info!("Downloading {} model from {}", model_type.display_name(), url);

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let hash = rt.block_on(download_file(url, &path))?;

        if !self.is_model_available(model_type) {
            anyhow::bail!("Download completed but model verification failed for {:?}", path);
        }

        if let Err(e) = self.record_download(model_type, hash) {
            warn!("Failed to update model manifest: {:#}", e);
        }

        info!("Successfully downloaded {} model", model_type.display_name());
        Ok(())
    }

    fn record_download(&self, model_type: ModelType, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let size_bytes = std::fs::metadata(self.model_path(model_type))?.len();
        let downloaded_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename: model_type.filename().to_string(),
            size_bytes,
            sha256,
            downloaded_at,
        };

        let existing = manifest.models.iter_mut().find(|m| m.filename == model_info.filename);
        if let Some(existing) = existing {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            Ok(crate::storage::load_json(&manifest_path)?)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        crate::storage::save_json(manifest, &self.models_dir.join("manifest.json"))?;
        Ok(())
    }
}

/// Stream `url` into `path` through a temp file, returning the SHA-256 hex digest
async fn download_file(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
    }

    file.flush().context("Failed to flush temp file")?;
    drop(file);

    std::fs::rename(&temp_path, path).context("Failed to move downloaded file to final location")?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Loaded ONNX model ready for inference
pub struct OnnxSession {
    session: Session,
}

fn base_builder() -> Result<SessionBuilder> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?)
}

impl OnnxSession {
    /// Load a model on the CPU execution provider
    pub fn new(model_path: &Path) -> Result<Self> {
        debug!("Loading ONNX model {:?} (CPU)", model_path);
        Self::commit(base_builder()?, model_path)
    }

    /// Load a model, preferring a GPU provider and falling back to CPU
    pub fn new_with_gpu(model_path: &Path) -> Result<Self> {
        debug!("Loading ONNX model {:?} (GPU preferred)", model_path);

        #[cfg(target_os = "windows")]
        let provider = ort::execution_providers::DirectMLExecutionProvider::default().build();
        #[cfg(not(target_os = "windows"))]
        let provider = ort::execution_providers::CUDAExecutionProvider::default().build();

        let builder = match base_builder()?.with_execution_providers([provider]) {
            Ok(builder) => builder,
            Err(e) => {
                warn!("GPU execution provider unavailable, using CPU: {}", e);
                base_builder()?
            }
        };

        Self::commit(builder, model_path)
    }

    fn commit(builder: SessionBuilder, model_path: &Path) -> Result<Self> {
        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let name = model_path.file_name().unwrap_or_default();
        info!("Loaded {:?}: inputs {:?}, outputs {:?}", name, inputs, outputs);

        Ok(Self { session })
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
