//! PDF pages via PDFium

use anyhow::Result;
use image::{Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::info;

use super::{validate_scale, PageSource};
use crate::error::PipelineError;

/// Bind the PDFium library.
///
/// Searches for libpdfium in:
/// 1. Current directory
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn bind_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| anyhow::anyhow!("Failed to load PDFium library: {:?}", e))?;

    Ok(Pdfium::new(bindings))
}

/// A PDF document opened from an in-memory byte buffer
pub struct PdfDocumentSource<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfDocumentSource<'a> {
    /// Open a document from raw PDF bytes
    pub fn from_bytes(pdfium: &'a Pdfium, bytes: Vec<u8>) -> Result<Self, PipelineError> {
        let size = bytes.len();
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| PipelineError::input(format!("unable to open PDF: {:?}", e)))?;

        info!("Opened PDF ({} bytes, {} pages)", size, document.pages().len());
        Ok(Self { document })
    }
}

impl PageSource for PdfDocumentSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn rasterize(&self, index: usize, scale: f32) -> Result<RgbImage, PipelineError> {
        validate_scale(scale)?;

        let page_index = index
            .try_into()
            .map_err(|_| PipelineError::input(format!("page {} out of range", index)))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| PipelineError::input(format!("cannot load page {}: {:?}", index, e)))?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PipelineError::input(format!("cannot render page {}: {:?}", index, e)))?;

        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let bytes = bitmap.as_raw_bytes();

        Ok(bgra_to_rgb(&bytes, width, height))
    }
}

/// Convert a BGRA bitmap (rows possibly padded) into an RGB image
fn bgra_to_rgb(data: &[u8], width: u32, height: u32) -> RgbImage {
    let stride = if height > 0 { data.len() / height as usize } else { 0 };

    RgbImage::from_fn(width, height, |x, y| {
        let idx = y as usize * stride + x as usize * 4;
        match data.get(idx..idx + 3) {
            Some(px) => Rgb([px[2], px[1], px[0]]),
            None => Rgb([255, 255, 255]),
        }
    })
}
