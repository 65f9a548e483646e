//! Error kinds surfaced by the extraction pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// Failure of one extraction run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable document, bad page index, invalid scale or page limit
    #[error("invalid input: {message}")]
    Input { message: String },

    /// The OCR engine failed on a page
    #[error("text detection failed on page {page}")]
    Detection {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading or writing an index document failed
    #[error("failed to persist {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a rendered page image failed
    #[error("failed to write rendered page {}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Operation called in a session state that does not allow it
    #[error("cannot {action} while session is {state:?}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
}

impl PipelineError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }
}
