//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Rasterization and highlight drawing settings
    pub render: RenderSettings,
    /// Where index documents and rendered pages are written
    pub output: OutputSettings,
    /// Processing run settings
    pub session: SessionConfig,
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Detections below this confidence are discarded (0.0 - 1.0)
    pub min_confidence: f32,
    /// Directory holding the ONNX models; defaults to the per-user data dir
    pub models_dir: Option<PathBuf>,
    /// Try GPU execution providers before falling back to CPU
    pub use_gpu: bool,
    /// Longest side of the image fed to the detection model
    pub det_limit_side: u32,
    /// Input height of the recognition model
    pub rec_image_height: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            models_dir: None,
            use_gpu: false,
            det_limit_side: 960,
            rec_image_height: 48,
        }
    }
}

/// Rasterization and highlight settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Pixels per PDF point
    pub scale: f32,
    /// Outline width in pixels
    pub highlight_width: u32,
    /// Outline color as RGB
    pub highlight_color: [u8; 3],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            highlight_width: 2,
            highlight_color: [255, 0, 0],
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory for the index documents
    pub dir: PathBuf,
    /// File name of the summary index
    pub layout_file: String,
    /// File name of the word index
    pub words_file: String,
    /// Directory for rendered page images (not written when unset)
    pub render_dir: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            layout_file: "layout.json".to_string(),
            words_file: "wordjson.json".to_string(),
            render_dir: None,
        }
    }
}

/// Processing run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Page limit used when none is given on the command line
    pub default_max_pages: usize,
    /// Keep going with an empty word list when OCR fails on a page
    pub isolate_page_failures: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_pages: 5,
            isolate_page_failures: false,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
