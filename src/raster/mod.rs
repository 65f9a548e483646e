//! Page Rasterization
//!
//! Converts document pages into RGB rasters for OCR and highlight rendering.

pub mod pdf;

use image::RgbImage;
use std::collections::HashMap;
use tracing::debug;

use crate::error::PipelineError;

pub use pdf::{bind_pdfium, PdfDocumentSource};

/// A paginated document that can be rendered to pixels
pub trait PageSource {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Render page `index` at `scale` pixels per native unit
    fn rasterize(&self, index: usize, scale: f32) -> Result<RgbImage, PipelineError>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn rasterize(&self, index: usize, scale: f32) -> Result<RgbImage, PipelineError> {
        (**self).rasterize(index, scale)
    }
}

/// Reject scales that cannot produce an image
pub fn validate_scale(scale: f32) -> Result<(), PipelineError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::input(format!("render scale must be positive, got {}", scale)))
    }
}

/// Rasters of one run, keyed by page index and scale.
///
/// The OCR pass and the highlight pass share the same pixels, so the boxes
/// always line up with the image they are drawn on.
#[derive(Debug, Default)]
pub struct RasterCache {
    rasters: HashMap<(usize, u32), RgbImage>,
}

impl RasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raster for a page, rendering it on first use
    pub fn get_or_render<S: PageSource + ?Sized>(
        &mut self,
        source: &S,
        index: usize,
        scale: f32,
    ) -> Result<&RgbImage, PipelineError> {
        let key = (index, scale.to_bits());
        if !self.rasters.contains_key(&key) {
            let image = source.rasterize(index, scale)?;
            let (width, height) = image.dimensions();
            debug!("Rasterized page {} at {}x: {}x{}", index, scale, width, height);
            self.rasters.insert(key, image);
        }
        Ok(&self.rasters[&key])
    }

    pub fn clear(&mut self) {
        self.rasters.clear();
    }
}
