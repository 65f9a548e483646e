//! Storage Layer
//!
//! Persists the word and summary indices as pretty-printed JSON documents and
//! resolves the per-user config/data directories.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::OutputSettings;
use crate::error::PipelineError;
use crate::index::{SummaryIndex, WordIndex};

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "pdfwordhighlighter", "PdfWordHighlighter")
        .ok_or_else(|| anyhow::anyhow!("Could not determine per-user directories"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs()?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs()?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Serialize `value` as 2-space indented JSON, replacing `path` wholesale.
///
/// The document is written to a sibling temp file first and renamed into
/// place, so readers never observe a truncated file.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::persistence(path, e))?;
    }

    let content =
        serde_json::to_string_pretty(value).map_err(|e| PipelineError::persistence(path, e))?;

    let temp_path = temp_path_for(path);
    std::fs::write(&temp_path, content).map_err(|e| PipelineError::persistence(&temp_path, e))?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        std::fs::remove_file(&temp_path).ok();
        return Err(PipelineError::persistence(path, e));
    }

    debug!("Wrote {:?}", path);
    Ok(())
}

/// Read a JSON document written by [`save_json`]
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::persistence(path, e))?;
    serde_json::from_str(&content).map_err(|e| PipelineError::persistence(path, e))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Location of the two index documents
#[derive(Debug, Clone)]
pub struct IndexStore {
    layout_path: PathBuf,
    words_path: PathBuf,
}

impl IndexStore {
    /// Store using the default file names inside `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::from_settings(&OutputSettings {
            dir: dir.into(),
            ..OutputSettings::default()
        })
    }

    pub fn from_settings(settings: &OutputSettings) -> Self {
        Self {
            layout_path: settings.dir.join(&settings.layout_file),
            words_path: settings.dir.join(&settings.words_file),
        }
    }

    /// Path of the summary index document
    pub fn layout_path(&self) -> &Path {
        &self.layout_path
    }

    /// Path of the word index document
    pub fn words_path(&self) -> &Path {
        &self.words_path
    }

    /// Overwrite both documents with the given indices
    pub fn save(&self, words: &WordIndex, summaries: &SummaryIndex) -> Result<(), PipelineError> {
        save_json(summaries, &self.layout_path)?;
        save_json(words, &self.words_path)?;
        info!(
            "Saved {} page(s) to {:?} and {:?}",
            words.len(),
            self.layout_path,
            self.words_path
        );
        Ok(())
    }
}

#[cfg(test)]
impl IndexStore {
    pub fn load_words(&self) -> Result<WordIndex, PipelineError> {
        load_json(&self.words_path)
    }

    pub fn load_summaries(&self) -> Result<SummaryIndex, PipelineError> {
        load_json(&self.layout_path)
    }
}
