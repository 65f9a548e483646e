//! Vision/OCR Layer
//!
//! Runs text detection and recognition over page rasters. The rest of the
//! pipeline only sees the [`WordDetector`] trait; the shipped engine is
//! PaddleOCR via ONNX Runtime.

pub mod models;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;

use anyhow::Result;
use image::RgbImage;

pub use ocr::PaddleOcrEngine;

/// Raw OCR output for one recognized text region
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Corner points in image pixel coordinates
    pub quad: [(f32, f32); 4],
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Something that finds text regions in a page raster.
///
/// Detections may come back in any order; an image without text yields an
/// empty vector.
pub trait WordDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

impl<D: WordDetector + ?Sized> WordDetector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }
}
